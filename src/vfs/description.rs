//! Declarative filesystem descriptions
//!
//! A description is plain data: the tree is built from it in one pass by
//! [`Node::new_root`](super::Node::new_root), after every name has been
//! validated.

use super::file::{DeviceGenerator, DeviceOps};
use super::node::{AccessType, FilePermission};
use crate::kernel::program::{Executable, ExecutableGenerator};
use std::fmt;
use std::rc::Rc;

/// Description of a single node
#[derive(Clone)]
pub enum NodeDescription {
    Directory(DirectoryDescription),
    TextFile(TextFileDescription),
    BinaryFile(BinaryFileDescription),
    DeviceFile(DeviceFileDescription),
}

#[derive(Clone)]
pub struct DirectoryDescription {
    pub name: String,
    pub access: AccessType,
    pub children: Vec<NodeDescription>,
}

#[derive(Clone)]
pub struct TextFileDescription {
    pub name: String,
    pub access: AccessType,
    pub permissions: FilePermission,
    pub content: String,
}

#[derive(Clone)]
pub struct BinaryFileDescription {
    pub name: String,
    pub access: AccessType,
    pub permissions: FilePermission,
    /// Called once per process started from this file
    pub generator: ExecutableGenerator,
}

#[derive(Clone)]
pub struct DeviceFileDescription {
    pub name: String,
    pub access: AccessType,
    pub permissions: FilePermission,
    /// Called once when the tree is built
    pub generator: DeviceGenerator,
}

impl DirectoryDescription {
    pub fn new(name: impl Into<String>, children: Vec<NodeDescription>) -> Self {
        Self {
            name: name.into(),
            access: AccessType::Normal,
            children,
        }
    }

    pub fn with_access(mut self, access: AccessType) -> Self {
        self.access = access;
        self
    }
}

impl NodeDescription {
    pub fn directory(name: impl Into<String>, children: Vec<NodeDescription>) -> Self {
        NodeDescription::Directory(DirectoryDescription::new(name, children))
    }

    pub fn text_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        NodeDescription::TextFile(TextFileDescription {
            name: name.into(),
            access: AccessType::Normal,
            permissions: FilePermission::ReadWrite,
            content: content.into(),
        })
    }

    pub fn binary_file<F>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn() -> Executable + 'static,
    {
        NodeDescription::BinaryFile(BinaryFileDescription {
            name: name.into(),
            access: AccessType::Normal,
            permissions: FilePermission::ReadWrite,
            generator: Rc::new(generator),
        })
    }

    pub fn device_file<F>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn() -> DeviceOps + 'static,
    {
        NodeDescription::DeviceFile(DeviceFileDescription {
            name: name.into(),
            access: AccessType::Normal,
            permissions: FilePermission::ReadWrite,
            generator: Rc::new(generator),
        })
    }

    pub fn with_access(mut self, access: AccessType) -> Self {
        match &mut self {
            NodeDescription::Directory(d) => d.access = access,
            NodeDescription::TextFile(f) => f.access = access,
            NodeDescription::BinaryFile(f) => f.access = access,
            NodeDescription::DeviceFile(f) => f.access = access,
        }
        self
    }

    /// Set the permission bits. Directories have none, so this is a no-op
    /// for them.
    pub fn with_permissions(mut self, permissions: FilePermission) -> Self {
        match &mut self {
            NodeDescription::Directory(_) => {}
            NodeDescription::TextFile(f) => f.permissions = permissions,
            NodeDescription::BinaryFile(f) => f.permissions = permissions,
            NodeDescription::DeviceFile(f) => f.permissions = permissions,
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            NodeDescription::Directory(d) => &d.name,
            NodeDescription::TextFile(f) => &f.name,
            NodeDescription::BinaryFile(f) => &f.name,
            NodeDescription::DeviceFile(f) => &f.name,
        }
    }
}

impl From<DirectoryDescription> for NodeDescription {
    fn from(description: DirectoryDescription) -> Self {
        NodeDescription::Directory(description)
    }
}

impl fmt::Debug for NodeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeDescription::Directory(d) => d.fmt(f),
            NodeDescription::TextFile(t) => f
                .debug_struct("TextFile")
                .field("name", &t.name)
                .field("access", &t.access)
                .field("permissions", &t.permissions)
                .finish(),
            NodeDescription::BinaryFile(b) => f
                .debug_struct("BinaryFile")
                .field("name", &b.name)
                .field("access", &b.access)
                .field("permissions", &b.permissions)
                .finish_non_exhaustive(),
            NodeDescription::DeviceFile(d) => f
                .debug_struct("DeviceFile")
                .field("name", &d.name)
                .field("access", &d.access)
                .field("permissions", &d.permissions)
                .finish_non_exhaustive(),
        }
    }
}

impl fmt::Debug for DirectoryDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("children", &self.children)
            .finish()
    }
}
