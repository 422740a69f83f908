//! The process-facing API
//!
//! Every executable body receives a [`ProcessHandle`]. All of its calls are
//! interruption checkpoints: async calls yield once, wait while the process
//! is stopped and unwind once it is a zombie; sync calls only unwind.

use super::process::{Pgid, Pid, Process};
use super::program;
use super::signal::Signal;
use super::table::ProcessTable;
use crate::error::{ProcessError, ProcessResult, UnixError};
use crate::vfs::{FileHandle, Node};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// What `execute` runs: a file, or a path resolved against the context
#[derive(Debug, Clone)]
pub enum ExecTarget {
    File(Rc<Node>),
    Path(String),
}

impl From<Rc<Node>> for ExecTarget {
    fn from(node: Rc<Node>) -> Self {
        ExecTarget::File(node)
    }
}

impl From<&Rc<Node>> for ExecTarget {
    fn from(node: &Rc<Node>) -> Self {
        ExecTarget::File(Rc::clone(node))
    }
}

impl From<&FileProxy> for ExecTarget {
    fn from(file: &FileProxy) -> Self {
        ExecTarget::File(Rc::clone(&file.node))
    }
}

impl From<&NodeProxy> for ExecTarget {
    fn from(node: &NodeProxy) -> Self {
        ExecTarget::File(Rc::clone(node.node()))
    }
}

impl From<&str> for ExecTarget {
    fn from(path: &str) -> Self {
        ExecTarget::Path(path.to_string())
    }
}

impl From<String> for ExecTarget {
    fn from(path: String) -> Self {
        ExecTarget::Path(path)
    }
}

/// Outcome of `execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executed {
    /// Started in the background
    Spawned(Pid),
    /// Ran in the foreground to completion
    Exited(i32),
}

impl Executed {
    pub fn pid(&self) -> Option<Pid> {
        match self {
            Executed::Spawned(pid) => Some(*pid),
            Executed::Exited(_) => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Executed::Exited(code) => Some(*code),
            Executed::Spawned(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct ProcessHandle {
    process: Rc<Process>,
}

impl ProcessHandle {
    pub(crate) fn new(process: Rc<Process>) -> Self {
        Self { process }
    }

    async fn checkpoint(&self) -> ProcessResult<()> {
        self.process.checkpoint().await
    }

    fn table(&self) -> ProcessResult<ProcessTable> {
        Ok(self.process.table()?)
    }

    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn ppid(&self) -> Pid {
        self.process.ppid()
    }

    pub fn pgid(&self) -> Pgid {
        self.process.pgid()
    }

    /// Wrap a file so its I/O goes through this process's checkpoints
    pub fn file(&self, node: Rc<Node>) -> ProcessResult<FileProxy> {
        self.process.check_alive()?;
        node.as_file()?;
        Ok(FileProxy {
            node,
            process: Rc::clone(&self.process),
        })
    }

    pub fn file_stream(&self, index: usize) -> ProcessResult<FileProxy> {
        self.process.check_alive()?;
        let node = self.process.context().file_stream(index)?;
        self.file(node)
    }

    pub fn set_file_stream(&self, index: usize, file: &FileProxy) -> ProcessResult<()> {
        self.process.check_alive()?;
        self.process
            .context_mut()
            .set_file_stream(index, Rc::clone(&file.node))?;
        Ok(())
    }

    pub fn stdin(&self) -> ProcessResult<FileProxy> {
        self.file_stream(crate::vfs::context::STDIN)
    }

    pub fn stdout(&self) -> ProcessResult<FileProxy> {
        self.file_stream(crate::vfs::context::STDOUT)
    }

    pub fn stderr(&self) -> ProcessResult<FileProxy> {
        self.file_stream(crate::vfs::context::STDERR)
    }

    pub fn set_stdin(&self, file: &FileProxy) -> ProcessResult<()> {
        self.set_file_stream(crate::vfs::context::STDIN, file)
    }

    pub fn set_stdout(&self, file: &FileProxy) -> ProcessResult<()> {
        self.set_file_stream(crate::vfs::context::STDOUT, file)
    }

    pub fn set_stderr(&self, file: &FileProxy) -> ProcessResult<()> {
        self.set_file_stream(crate::vfs::context::STDERR, file)
    }

    pub fn current_working_directory(&self) -> ProcessResult<DirectoryProxy> {
        self.process.check_alive()?;
        let node = Rc::clone(self.process.context().current_working_directory());
        Ok(DirectoryProxy::new(node, &self.process))
    }

    pub fn home_directory(&self) -> ProcessResult<DirectoryProxy> {
        self.process.check_alive()?;
        let node = Rc::clone(self.process.context().home_directory());
        Ok(DirectoryProxy::new(node, &self.process))
    }

    pub fn resolve_path(&self, path: &str, allow_hidden: bool) -> ProcessResult<NodeProxy> {
        self.process.check_alive()?;
        let node = self.process.context().resolve_path(path, allow_hidden)?;
        Ok(NodeProxy::wrap(node, &self.process))
    }

    /// Resolve a path that must name a file
    pub fn open_path(&self, path: &str, allow_hidden: bool) -> ProcessResult<FileProxy> {
        self.resolve_path(path, allow_hidden)?.as_file()
    }

    pub fn change_directory(&self, path: &str, allow_hidden: bool) -> ProcessResult<()> {
        self.process.check_alive()?;
        self.process
            .context_mut()
            .change_directory(path, allow_hidden)?;
        Ok(())
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.process.context().env(key).map(str::to_string)
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.process.context_mut().set_env(key, value);
    }

    pub fn environment(&self) -> BTreeMap<String, String> {
        self.process.context().environment().clone()
    }

    /// `(write_end, read_end)`
    pub fn create_pipe(&self) -> ProcessResult<(FileProxy, FileProxy)> {
        self.process.check_alive()?;
        let (write_end, read_end) = self.process.context().create_pipe();
        Ok((self.file(write_end)?, self.file(read_end)?))
    }

    /// The error to unwind with: `return Err(process.exit(code))`.
    /// A process that is already a zombie keeps its original result.
    pub fn exit(&self, code: i32) -> ProcessError {
        self.process
            .interruption()
            .unwrap_or(ProcessError::Exit(code))
    }

    /// Start a child process. In the background this returns its PID right
    /// away; in the foreground it waits and returns the exit code.
    pub async fn execute<T, I, S>(&self, target: T, args: I, background: bool) -> ProcessResult<Executed>
    where
        T: Into<ExecTarget>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkpoint().await?;
        let file = match target.into() {
            ExecTarget::File(node) => node,
            ExecTarget::Path(path) => Rc::clone(self.resolve_path(&path, false)?.node()),
        };
        let pid = self.table()?.start_process(Some(self.pid()), &file, args)?;
        if background {
            return Ok(Executed::Spawned(pid));
        }
        self.wait(pid).await.map(Executed::Exited)
    }

    /// Wait for a process to finish and reap it
    pub async fn wait(&self, pid: Pid) -> ProcessResult<i32> {
        self.checkpoint().await?;
        let result = self.table()?.wait_to_finish(pid).await;
        self.checkpoint().await?;
        result
    }

    pub fn register_signal_handler<F, Fut>(&self, signal: Signal, handler: F) -> ProcessResult<()>
    where
        F: Fn(ProcessHandle, Signal) -> Fut + 'static,
        Fut: Future<Output = ProcessResult<()>> + 'static,
    {
        self.process.check_alive()?;
        self.process
            .register_signal_handler(signal, program::signal_handler(handler))?;
        Ok(())
    }

    pub async fn send_signal(&self, pid: Pid, signal: Signal) -> ProcessResult<()> {
        self.checkpoint().await?;
        let result = self.table()?.send_signal(pid, signal).await;
        self.checkpoint().await?;
        result
    }

    /// Signal a process group; the foreground group when `pgid` is `None`
    pub async fn send_group_signal(&self, pgid: Option<Pgid>, signal: Signal) -> ProcessResult<()> {
        self.checkpoint().await?;
        let result = self.table()?.send_group_signal(pgid, signal).await;
        self.checkpoint().await?;
        result
    }

    /// Move this process into another group
    pub fn set_process_group(&self, pgid: Pgid) -> ProcessResult<()> {
        self.process.check_alive()?;
        self.process.set_pgid(pgid);
        Ok(())
    }

    /// Stop this process. The body halts at its next checkpoint.
    pub fn stop(&self) {
        self.process.stop();
    }

    pub async fn resume(&self) -> ProcessResult<()> {
        self.process.resume().await
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcessHandle").field(&self.process).finish()
    }
}

/// A node as seen by a running process
///
/// Proxies never hand out the underlying node: every operation first
/// checks that the process is still alive.
#[derive(Clone, Debug)]
pub enum NodeProxy {
    Directory(DirectoryProxy),
    File(FileProxy),
}

impl NodeProxy {
    fn wrap(node: Rc<Node>, process: &Rc<Process>) -> Self {
        if node.is_directory() {
            NodeProxy::Directory(DirectoryProxy::new(node, process))
        } else {
            NodeProxy::File(FileProxy {
                node,
                process: Rc::clone(process),
            })
        }
    }

    fn node(&self) -> &Rc<Node> {
        match self {
            NodeProxy::Directory(dir) => &dir.node,
            NodeProxy::File(file) => &file.node,
        }
    }

    fn process(&self) -> &Rc<Process> {
        match self {
            NodeProxy::Directory(dir) => &dir.process,
            NodeProxy::File(file) => &file.process,
        }
    }

    pub fn name(&self) -> &str {
        self.node().name()
    }

    pub fn absolute_path(&self) -> String {
        self.node().absolute_path()
    }

    pub fn is_readable(&self) -> bool {
        self.node().is_readable()
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, NodeProxy::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, NodeProxy::File(_))
    }

    /// `IsADirectory` for directories
    pub fn as_file(&self) -> ProcessResult<FileProxy> {
        self.process().check_alive()?;
        match self {
            NodeProxy::File(file) => Ok(file.clone()),
            NodeProxy::Directory(_) => Err(UnixError::IsADirectory.into()),
        }
    }

    /// `NotADirectory` for files
    pub fn as_directory(&self) -> ProcessResult<DirectoryProxy> {
        self.process().check_alive()?;
        match self {
            NodeProxy::Directory(dir) => Ok(dir.clone()),
            NodeProxy::File(_) => Err(UnixError::NotADirectory.into()),
        }
    }
}

/// A directory as seen by a running process
#[derive(Clone)]
pub struct DirectoryProxy {
    node: Rc<Node>,
    process: Rc<Process>,
}

impl DirectoryProxy {
    fn new(node: Rc<Node>, process: &Rc<Process>) -> Self {
        Self {
            node,
            process: Rc::clone(process),
        }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn absolute_path(&self) -> String {
        self.node.absolute_path()
    }

    pub fn is_readable(&self) -> bool {
        self.node.is_readable()
    }

    /// The root is its own parent
    pub fn parent(&self) -> ProcessResult<DirectoryProxy> {
        self.process.check_alive()?;
        Ok(DirectoryProxy::new(self.node.parent(), &self.process))
    }

    /// Sorted child names, including `.` and `..`
    pub fn children_names(&self, include_hidden: bool) -> ProcessResult<Vec<String>> {
        self.process.check_alive()?;
        Ok(self.node.children_names(include_hidden)?)
    }

    pub fn child(&self, name: &str, include_hidden: bool) -> ProcessResult<NodeProxy> {
        self.process.check_alive()?;
        let child = self.node.child(name, include_hidden)?;
        Ok(NodeProxy::wrap(child, &self.process))
    }
}

impl fmt::Debug for DirectoryProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryProxy")
            .field("path", &self.node.absolute_path())
            .field("pid", &self.process.pid())
            .finish()
    }
}

/// A file as seen by a running process
#[derive(Clone)]
pub struct FileProxy {
    node: Rc<Node>,
    process: Rc<Process>,
}

impl FileProxy {
    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn absolute_path(&self) -> String {
        self.node.absolute_path()
    }

    pub fn is_readable(&self) -> bool {
        self.node.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.node.is_writable()
    }

    pub fn is_executable(&self) -> bool {
        self.node.is_executable()
    }

    pub async fn read(&self) -> ProcessResult<String> {
        self.process.checkpoint().await?;
        Ok(self.node.read().await?)
    }

    /// Replace the whole content
    pub async fn write(&self, content: &str) -> ProcessResult<()> {
        self.process.checkpoint().await?;
        Ok(self.node.write(content, false).await?)
    }

    pub async fn append(&self, content: &str) -> ProcessResult<()> {
        self.process.checkpoint().await?;
        Ok(self.node.append(content).await?)
    }

    pub fn open(&self) -> ProcessResult<OpenFile> {
        self.process.check_alive()?;
        Ok(OpenFile {
            handle: self.node.open()?,
            process: Rc::clone(&self.process),
        })
    }
}

impl fmt::Debug for FileProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileProxy")
            .field("path", &self.node.absolute_path())
            .field("pid", &self.process.pid())
            .finish()
    }
}

/// A file cursor as seen by a running process
pub struct OpenFile {
    handle: FileHandle,
    process: Rc<Process>,
}

impl OpenFile {
    pub fn position(&self) -> usize {
        self.handle.position()
    }

    pub fn seek(&self, position: i64) {
        self.handle.seek(position);
    }

    pub async fn read(&self, max_chars: usize) -> ProcessResult<String> {
        self.process.checkpoint().await?;
        Ok(self.handle.read(max_chars).await?)
    }

    pub async fn read_line(&self) -> ProcessResult<String> {
        self.process.checkpoint().await?;
        Ok(self.handle.read_line().await?)
    }

    pub async fn write(&self, content: &str, truncate_after: bool) -> ProcessResult<()> {
        self.process.checkpoint().await?;
        Ok(self.handle.write(content, truncate_after).await?)
    }
}
