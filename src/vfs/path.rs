//! Path syntax
//!
//! `/a/b` is absolute, `~` and `~/a` start at the home directory, anything
//! else is relative to the current working directory. Empty components are
//! dropped, so `//a///b/` names the same thing as `/a/b`.

pub const PATH_SEPARATOR: char = '/';
pub const HOME: &str = "~";

/// Where a path starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBase {
    Root,
    Home,
    Current,
}

/// A parsed path: a starting point plus the components to walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsPath {
    base: PathBase,
    parts: Vec<String>,
}

impl FsPath {
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        let (base, rest) = if path.starts_with(PATH_SEPARATOR) {
            (PathBase::Root, path)
        } else if path == HOME {
            (PathBase::Home, "")
        } else if let Some(rest) = path.strip_prefix("~/") {
            (PathBase::Home, rest)
        } else {
            (PathBase::Current, path)
        };
        let parts = rest
            .split(PATH_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        Self { base, parts }
    }

    pub fn base(&self) -> PathBase {
        self.base
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn is_absolute(&self) -> bool {
        self.base == PathBase::Root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute() {
        let path = FsPath::parse("/home/user");
        assert!(path.is_absolute());
        assert_eq!(path.parts(), ["home", "user"]);
    }

    #[test]
    fn test_root_only() {
        let path = FsPath::parse("/");
        assert_eq!(path.base(), PathBase::Root);
        assert!(path.parts().is_empty());
    }

    #[test]
    fn test_home() {
        assert_eq!(FsPath::parse("~").base(), PathBase::Home);
        let path = FsPath::parse("~/docs/a.txt");
        assert_eq!(path.base(), PathBase::Home);
        assert_eq!(path.parts(), ["docs", "a.txt"]);
    }

    #[test]
    fn test_tilde_inside_name_is_relative() {
        let path = FsPath::parse("~backup");
        assert_eq!(path.base(), PathBase::Current);
        assert_eq!(path.parts(), ["~backup"]);
    }

    #[test]
    fn test_empty_components_and_whitespace() {
        let path = FsPath::parse("  //a///b/  ");
        assert_eq!(path.base(), PathBase::Root);
        assert_eq!(path.parts(), ["a", "b"]);

        let relative = FsPath::parse("./x/../y");
        assert_eq!(relative.base(), PathBase::Current);
        assert_eq!(relative.parts(), [".", "x", "..", "y"]);
    }

    #[test]
    fn test_empty_path_is_current_directory() {
        let path = FsPath::parse("");
        assert_eq!(path.base(), PathBase::Current);
        assert!(path.parts().is_empty());
    }
}
