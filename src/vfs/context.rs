//! Execution contexts
//!
//! What a process sees of the system: the shared tree, its home and working
//! directories, its environment and its numbered file streams. A child's
//! context is a value copy of its parent's; only the tree is shared.

use super::node::Node;
use super::path::{FsPath, PathBase};
use super::pipe;
use crate::error::{SysResult, UnixError};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const HOME_VAR: &str = "HOME";

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;
pub const STDERR: usize = 2;

/// Stream indices run from 0 to `MAX_FILE_STREAMS - 1`
pub const MAX_FILE_STREAMS: usize = 1024;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    root: Rc<Node>,
    home: Rc<Node>,
    cwd: Rc<Node>,
    env: BTreeMap<String, String>,
    streams: Vec<Option<Rc<Node>>>,
}

impl ExecutionContext {
    /// `env` must carry `HOME`, an absolute path to an existing directory.
    /// The working directory starts there.
    pub fn new<I, K, V>(root: Rc<Node>, env: I) -> SysResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        root.as_directory()?;
        let env: BTreeMap<String, String> = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let home_path = env
            .get(HOME_VAR)
            .ok_or_else(|| UnixError::invalid_argument("HOME must be set"))?;
        let parsed = FsPath::parse(home_path);
        if !parsed.is_absolute() {
            return Err(UnixError::invalid_argument(format!(
                "home path '{}' must be absolute",
                home_path
            )));
        }
        let home = root
            .resolve(parsed.parts(), false)
            .ok()
            .filter(|node| node.is_directory())
            .ok_or_else(|| {
                UnixError::invalid_argument(format!(
                    "home path '{}' must point to an existing directory",
                    home_path
                ))
            })?;

        Ok(Self {
            root,
            cwd: Rc::clone(&home),
            home,
            env,
            streams: Vec::new(),
        })
    }

    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }

    pub fn home_directory(&self) -> &Rc<Node> {
        &self.home
    }

    pub fn current_working_directory(&self) -> &Rc<Node> {
        &self.cwd
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn remove_env(&mut self, key: &str) -> Option<String> {
        self.env.remove(key)
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn file_stream(&self, index: usize) -> SysResult<Rc<Node>> {
        self.streams
            .get(index)
            .and_then(Option::clone)
            .ok_or_else(|| UnixError::internal(format!("file stream {} is not set", index)))
    }

    pub fn set_file_stream(&mut self, index: usize, file: Rc<Node>) -> SysResult<()> {
        file.as_file()?;
        let len = index
            .checked_add(1)
            .filter(|len| *len <= MAX_FILE_STREAMS)
            .ok_or_else(|| {
                UnixError::invalid_argument(format!("file stream {} is out of range", index))
            })?;
        if self.streams.len() < len {
            self.streams.resize(len, None);
        }
        self.streams[index] = Some(file);
        Ok(())
    }

    pub fn stdin(&self) -> SysResult<Rc<Node>> {
        self.file_stream(STDIN)
    }

    pub fn stdout(&self) -> SysResult<Rc<Node>> {
        self.file_stream(STDOUT)
    }

    pub fn stderr(&self) -> SysResult<Rc<Node>> {
        self.file_stream(STDERR)
    }

    pub fn resolve_path(&self, path: &str, allow_hidden: bool) -> SysResult<Rc<Node>> {
        let parsed = FsPath::parse(path);
        let base = match parsed.base() {
            PathBase::Root => &self.root,
            PathBase::Home => &self.home,
            PathBase::Current => &self.cwd,
        };
        base.resolve(parsed.parts(), allow_hidden)
    }

    pub fn change_directory(&mut self, path: &str, allow_hidden: bool) -> SysResult<()> {
        let target = self.resolve_path(path, allow_hidden)?;
        target.as_directory()?;
        log::trace!("cd {}", target.absolute_path());
        self.cwd = target;
        Ok(())
    }

    /// `(write_end, read_end)`, both reporting the working directory as
    /// their parent
    pub fn create_pipe(&self) -> (Rc<Node>, Rc<Node>) {
        pipe::create_pipe(&self.cwd)
    }
}
