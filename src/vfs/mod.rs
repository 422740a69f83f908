//! Virtual File System
//!
//! An immutable tree of directories and files, built once from a
//! declarative description. Only file contents change after construction.
//!
//! Design: `Rc` nodes with weak parent links, every operation checked
//! against the node's access type and the file's permission bits.

pub mod context;
pub mod description;
pub mod file;
pub mod node;
pub mod path;
pub mod pipe;

pub use context::ExecutionContext;
pub use description::{
    BinaryFileDescription, DeviceFileDescription, DirectoryDescription, NodeDescription,
    TextFileDescription,
};
pub use file::{
    BINARY_FILE_PLACEHOLDER, DeviceGenerator, DeviceOps, DeviceReadFn, DeviceWriteFn, FileHandle,
};
pub use node::{AccessType, FilePermission, Node};
pub use path::{FsPath, PathBase};
pub use pipe::PipeBuffer;
