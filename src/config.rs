//! Boot configuration
//!
//! Loaded from JSON:
//!
//! ```json
//! {
//!   "home": "/home/user",
//!   "env": { "PATH": "/bin" },
//!   "streams": [
//!     { "index": 0, "path": "/dev/tty" },
//!     { "index": 1, "path": "/dev/tty" }
//!   ],
//!   "startup": { "path": "/bin/sh", "args": ["-l"] }
//! }
//! ```

use crate::error::{SysResult, UnixError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Becomes `HOME`; must be absolute
    pub home: String,
    /// Extra environment for the first process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub streams: Vec<StreamBinding>,
    pub startup: StartupCommand,
}

/// Bind file stream `index` to the file at `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBinding {
    pub index: usize,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupCommand {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    pub fn new(home: impl Into<String>, startup: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            env: BTreeMap::new(),
            streams: Vec::new(),
            startup: StartupCommand {
                path: startup.into(),
                args: Vec::new(),
            },
        }
    }

    pub fn with_stream(mut self, index: usize, path: impl Into<String>) -> Self {
        self.streams.push(StreamBinding {
            index,
            path: path.into(),
        });
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_json(json: &str) -> SysResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| UnixError::invalid_argument(format!("malformed configuration: {}", e)))
    }

    pub fn to_json(&self) -> SysResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| UnixError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = Config::from_json(
            r#"{
                "home": "/home/user",
                "streams": [{ "index": 1, "path": "/dev/tty" }],
                "startup": { "path": "/bin/sh" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.home, "/home/user");
        assert!(config.env.is_empty());
        assert_eq!(config.streams, vec![StreamBinding { index: 1, path: "/dev/tty".into() }]);
        assert_eq!(config.startup.path, "/bin/sh");
        assert!(config.startup.args.is_empty());
    }

    #[test]
    fn test_builder_matches_json() {
        let built = Config::new("/home/user", "/bin/sh")
            .with_env("TERM", "dumb")
            .with_stream(0, "/dev/tty")
            .with_args(["-l"]);
        let parsed = Config::from_json(&built.to_json().unwrap()).unwrap();
        assert_eq!(parsed, built);
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            Config::from_json("{\"home\": 3}"),
            Err(UnixError::InvalidArgument(_))
        ));
        assert!(matches!(
            Config::from_json("{\"home\": \"/\"}"),
            Err(UnixError::InvalidArgument(_))
        ));
    }
}
