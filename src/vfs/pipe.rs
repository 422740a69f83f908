//! Anonymous pipes
//!
//! A pipe is a pair of device files over one shared buffer. The write end
//! appends, the read end drains from the front. Unbounded and never
//! blocking: reading an empty pipe yields "".

use super::file::{DeviceOps, FileContent, FileNode};
use super::node::{AccessType, FilePermission, Node};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const PIPE_WRITE_END: &str = "pipe-in";
pub const PIPE_READ_END: &str = "pipe-out";

/// The characters in flight through a pipe
#[derive(Debug, Default)]
pub struct PipeBuffer {
    data: VecDeque<char>,
}

impl PipeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, content: &str) {
        self.data.extend(content.chars());
    }

    /// Take up to `max` characters from the front (everything when `None`)
    pub fn drain(&mut self, max: Option<usize>) -> String {
        let count = max.unwrap_or(self.data.len()).min(self.data.len());
        self.data.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Create a pipe whose ends report `parent` as their directory.
/// Returns `(write_end, read_end)`.
pub fn create_pipe(parent: &Rc<Node>) -> (Rc<Node>, Rc<Node>) {
    let buffer = Rc::new(RefCell::new(PipeBuffer::new()));

    let sink = Rc::clone(&buffer);
    let write_end = FileNode::new(
        FilePermission::ReadWrite,
        FileContent::Device(DeviceOps::new().with_sync_writer(move |content| {
            sink.borrow_mut().push(&content);
            Ok(())
        })),
    );

    let source = Rc::clone(&buffer);
    let read_end = FileNode::new(
        FilePermission::ReadOnly,
        FileContent::Device(
            DeviceOps::new().with_sync_reader(move |max| Ok(source.borrow_mut().drain(max))),
        ),
    );

    (
        Node::detached_file(PIPE_WRITE_END, AccessType::Normal, write_end, parent),
        Node::detached_file(PIPE_READ_END, AccessType::Normal, read_end, parent),
    )
}
