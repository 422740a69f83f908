//! File contents, whole-file I/O and cursors
//!
//! Three kinds of content:
//! - text: a mutable character buffer
//! - binary: an executable generator, read as a placeholder
//! - device: async read/write callbacks, either of which may be absent
//!
//! Positions count characters, not bytes.

use super::node::{FilePermission, Node};
use crate::error::{ProcessError, SysResult, UnixError};
use crate::kernel::handle::ProcessHandle;
use crate::kernel::program::{Executable, ExecutableGenerator};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

/// What reading a binary file yields
pub const BINARY_FILE_PLACEHOLDER: &str = "<binary file>";

/// Device read callback; the argument is the maximum number of characters
/// wanted (`None` for everything available)
pub type DeviceReadFn = Rc<dyn Fn(Option<usize>) -> LocalBoxFuture<'static, SysResult<String>>>;
pub type DeviceWriteFn = Rc<dyn Fn(String) -> LocalBoxFuture<'static, SysResult<()>>>;
pub type DeviceGenerator = Rc<dyn Fn() -> DeviceOps>;

/// The callbacks behind a device file
#[derive(Clone, Default)]
pub struct DeviceOps {
    read: Option<DeviceReadFn>,
    write: Option<DeviceWriteFn>,
}

impl DeviceOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader<F, Fut>(mut self, reader: F) -> Self
    where
        F: Fn(Option<usize>) -> Fut + 'static,
        Fut: Future<Output = SysResult<String>> + 'static,
    {
        self.read = Some(Rc::new(move |max| reader(max).boxed_local()));
        self
    }

    pub fn with_writer<F, Fut>(mut self, writer: F) -> Self
    where
        F: Fn(String) -> Fut + 'static,
        Fut: Future<Output = SysResult<()>> + 'static,
    {
        self.write = Some(Rc::new(move |content| writer(content).boxed_local()));
        self
    }

    pub fn with_sync_reader<F>(self, reader: F) -> Self
    where
        F: Fn(Option<usize>) -> SysResult<String> + 'static,
    {
        self.with_reader(move |max| future::ready(reader(max)))
    }

    pub fn with_sync_writer<F>(self, writer: F) -> Self
    where
        F: Fn(String) -> SysResult<()> + 'static,
    {
        self.with_writer(move |content| future::ready(writer(content)))
    }

    async fn read(&self, max: Option<usize>) -> SysResult<String> {
        match &self.read {
            Some(read) => read(max).await,
            None => Err(UnixError::PermissionDenied),
        }
    }

    async fn write(&self, content: String) -> SysResult<()> {
        match &self.write {
            Some(write) => write(content).await,
            None => Err(UnixError::PermissionDenied),
        }
    }
}

pub(crate) enum FileContent {
    Text(RefCell<String>),
    Binary(ExecutableGenerator),
    Device(DeviceOps),
}

impl FileContent {
    pub(crate) fn text(content: impl Into<String>) -> Self {
        FileContent::Text(RefCell::new(content.into()))
    }
}

/// The file half of a [`Node`]
pub struct FileNode {
    permissions: FilePermission,
    content: FileContent,
}

impl FileNode {
    pub(crate) fn new(permissions: FilePermission, content: FileContent) -> Self {
        Self {
            permissions,
            content,
        }
    }

    pub fn permissions(&self) -> FilePermission {
        self.permissions
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self.content {
            FileContent::Text(_) => "text",
            FileContent::Binary(_) => "binary",
            FileContent::Device(_) => "device",
        }
    }

    /// Read characters `range.0..range.1`, or everything
    async fn read_range(&self, range: Option<(usize, usize)>) -> SysResult<String> {
        match &self.content {
            FileContent::Text(text) => Ok(slice_chars(&text.borrow(), range)),
            FileContent::Binary(_) => Ok(slice_chars(BINARY_FILE_PLACEHOLDER, range)),
            FileContent::Device(device) => {
                device.read(range.map(|(start, end)| end - start)).await
            }
        }
    }

    /// Write `content` at `position` (the end when `None`). The tail after
    /// the written text is kept unless `truncate` is set.
    async fn write_at(&self, content: &str, position: Option<usize>, truncate: bool) -> SysResult<()> {
        match &self.content {
            FileContent::Text(text) => {
                let mut text = text.borrow_mut();
                *text = splice_chars(&text, content, position, truncate);
                Ok(())
            }
            FileContent::Binary(_) => Err(UnixError::PermissionDenied),
            FileContent::Device(device) => device.write(content.to_string()).await,
        }
    }
}

fn slice_chars(s: &str, range: Option<(usize, usize)>) -> String {
    match range {
        Some((start, end)) => s.chars().skip(start).take(end.saturating_sub(start)).collect(),
        None => s.to_string(),
    }
}

fn splice_chars(current: &str, content: &str, position: Option<usize>, truncate: bool) -> String {
    let len = current.chars().count();
    let start = position.unwrap_or(len).min(len);
    let end = start.saturating_add(content.chars().count());
    let mut out: String = current.chars().take(start).collect();
    out.push_str(content);
    if !truncate {
        out.extend(current.chars().skip(end));
    }
    out
}

impl Node {
    /// Readable and carrying read-write permission
    pub fn is_writable(&self) -> bool {
        self.is_readable()
            && matches!(self.as_file(), Ok(f) if f.permissions == FilePermission::ReadWrite)
    }

    /// Readable and carrying execute permission
    pub fn is_executable(&self) -> bool {
        self.is_readable()
            && matches!(self.as_file(), Ok(f) if f.permissions == FilePermission::Execute)
    }

    /// Whole-file read
    pub async fn read(&self) -> SysResult<String> {
        let file = self.as_file()?;
        if !self.is_readable() {
            return Err(UnixError::PermissionDenied);
        }
        file.read_range(None).await
    }

    /// Whole-file write: replace the content, or append to it
    pub async fn write(&self, content: &str, append: bool) -> SysResult<()> {
        let file = self.as_file()?;
        if !self.is_writable() {
            return Err(UnixError::PermissionDenied);
        }
        if append {
            file.write_at(content, None, false).await
        } else {
            file.write_at(content, Some(0), true).await
        }
    }

    pub async fn append(&self, content: &str) -> SysResult<()> {
        self.write(content, true).await
    }

    /// Open a cursor at position 0
    pub fn open(self: &Rc<Self>) -> SysResult<FileHandle> {
        self.as_file()?;
        Ok(FileHandle {
            node: Rc::clone(self),
            position: Cell::new(0),
        })
    }

    /// Produce the program a process started from this file runs
    pub(crate) fn executable(self: &Rc<Self>) -> SysResult<Executable> {
        let file = self.as_file()?;
        if !self.is_executable() {
            return Err(UnixError::PermissionDenied);
        }
        match &file.content {
            FileContent::Binary(generator) => Ok(generator()),
            FileContent::Text(_) => {
                let script = Rc::clone(self);
                Ok(Executable::new(move |process: ProcessHandle, _args| async move {
                    let content = script.read().await?;
                    process.stdout()?.write(&content).await?;
                    Ok::<_, ProcessError>(())
                }))
            }
            FileContent::Device(_) => Err(UnixError::PermissionDenied),
        }
    }
}

/// A cursor over one file
///
/// Handles share the file's content but never each other's position.
pub struct FileHandle {
    node: Rc<Node>,
    position: Cell<usize>,
}

impl FileHandle {
    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    pub fn position(&self) -> usize {
        self.position.get()
    }

    /// Move the cursor; negative positions clamp to 0, there is no upper bound
    pub fn seek(&self, position: i64) {
        self.position.set(usize::try_from(position).unwrap_or(0));
    }

    /// Read up to `max_chars` characters and advance past them
    pub async fn read(&self, max_chars: usize) -> SysResult<String> {
        let file = self.node.as_file()?;
        if !self.node.is_readable() {
            return Err(UnixError::PermissionDenied);
        }
        let start = self.position.get();
        let content = file
            .read_range(Some((start, start.saturating_add(max_chars))))
            .await?;
        self.position
            .set(start.saturating_add(content.chars().count()));
        Ok(content)
    }

    /// Read until `\n` (consumed, not returned) or the end of the file
    pub async fn read_line(&self) -> SysResult<String> {
        let mut line = String::new();
        loop {
            let c = self.read(1).await?;
            if c.is_empty() || c == "\n" {
                return Ok(line);
            }
            line.push_str(&c);
        }
    }

    /// Overwrite at the cursor and advance past the written text
    pub async fn write(&self, content: &str, truncate_after: bool) -> SysResult<()> {
        let file = self.node.as_file()?;
        if !self.node.is_writable() {
            return Err(UnixError::PermissionDenied);
        }
        let start = self.position.get();
        file.write_at(content, Some(start), truncate_after).await?;
        self.position
            .set(start.saturating_add(content.chars().count()));
        Ok(())
    }
}
