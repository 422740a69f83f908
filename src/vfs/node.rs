//! Filesystem nodes and the path resolver
//!
//! The tree is `Rc<Node>` all the way down. Children are owned by their
//! directory; the parent link is weak. The root is its own parent.

use super::description::{DirectoryDescription, NodeDescription};
use super::file::{FileContent, FileNode};
use crate::error::{SysResult, UnixError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

pub const THIS_DIR: &str = ".";
pub const PARENT_DIR: &str = "..";

/// Who may see and traverse a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    #[default]
    Normal,
    /// Invisible without privileged access
    Hidden,
    /// Listed, but unreadable without privileged access
    Locked,
}

/// Permission bits of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilePermission {
    ReadOnly,
    #[default]
    ReadWrite,
    Execute,
}

pub(crate) enum NodeKind {
    Directory(Vec<Rc<Node>>),
    File(FileNode),
}

/// A directory or file in the tree
pub struct Node {
    pub(super) name: String,
    pub(super) access: AccessType,
    pub(super) parent: Weak<Node>,
    pub(super) kind: NodeKind,
}

impl Node {
    /// Build a tree from its root description
    pub fn new_root(description: DirectoryDescription) -> SysResult<Rc<Node>> {
        validate_directory(&description)?;
        log::debug!("building filesystem rooted at '{}'", description.name);
        Ok(Rc::new_cyclic(|me| {
            Self::build_directory(description, me.clone(), me)
        }))
    }

    fn build(description: NodeDescription, parent: Weak<Node>) -> Rc<Node> {
        match description {
            NodeDescription::Directory(d) => {
                Rc::new_cyclic(|me| Self::build_directory(d, parent, me))
            }
            NodeDescription::TextFile(t) => Rc::new(Node {
                name: t.name,
                access: t.access,
                parent,
                kind: NodeKind::File(FileNode::new(t.permissions, FileContent::text(t.content))),
            }),
            NodeDescription::BinaryFile(b) => Rc::new(Node {
                name: b.name,
                access: b.access,
                parent,
                kind: NodeKind::File(FileNode::new(b.permissions, FileContent::Binary(b.generator))),
            }),
            NodeDescription::DeviceFile(d) => Rc::new(Node {
                name: d.name,
                access: d.access,
                parent,
                kind: NodeKind::File(FileNode::new(
                    d.permissions,
                    FileContent::Device((d.generator)()),
                )),
            }),
        }
    }

    fn build_directory(
        description: DirectoryDescription,
        parent: Weak<Node>,
        me: &Weak<Node>,
    ) -> Node {
        let children = description
            .children
            .into_iter()
            .map(|child| Self::build(child, me.clone()))
            .collect();
        Node {
            name: description.name,
            access: description.access,
            parent,
            kind: NodeKind::Directory(children),
        }
    }

    /// A file that lives outside its parent's listing (pipe ends, init's
    /// binary). It still knows its parent for path purposes.
    pub(crate) fn detached_file(
        name: &str,
        access: AccessType,
        file: FileNode,
        parent: &Rc<Node>,
    ) -> Rc<Node> {
        Rc::new(Node {
            name: name.to_string(),
            access,
            parent: Rc::downgrade(parent),
            kind: NodeKind::File(file),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn is_visible(&self) -> bool {
        self.access != AccessType::Hidden
    }

    pub fn is_readable(&self) -> bool {
        self.access == AccessType::Normal
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    /// The containing directory. A node whose tree has been dropped
    /// behaves as a root.
    pub fn parent(self: &Rc<Self>) -> Rc<Node> {
        self.parent.upgrade().unwrap_or_else(|| Rc::clone(self))
    }

    pub fn is_root(self: &Rc<Self>) -> bool {
        Rc::ptr_eq(&self.parent(), self)
    }

    /// `/` for the root, `/a/b` otherwise
    pub fn absolute_path(self: &Rc<Self>) -> String {
        let mut parts = Vec::new();
        let mut node = Rc::clone(self);
        loop {
            let parent = node.parent();
            if Rc::ptr_eq(&parent, &node) {
                break;
            }
            parts.push(node.name.clone());
            node = parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    pub fn as_file(&self) -> SysResult<&FileNode> {
        match &self.kind {
            NodeKind::File(file) => Ok(file),
            NodeKind::Directory(_) => Err(UnixError::IsADirectory),
        }
    }

    fn entries(&self) -> SysResult<&[Rc<Node>]> {
        match &self.kind {
            NodeKind::Directory(children) => Ok(children),
            NodeKind::File(_) => Err(UnixError::NotADirectory),
        }
    }

    /// Fails NotADirectory for files
    pub fn as_directory(&self) -> SysResult<&Self> {
        self.entries().map(|_| self)
    }

    fn check_listable(&self, include_hidden: bool) -> SysResult<&[Rc<Node>]> {
        let children = self.entries()?;
        if !include_hidden && !self.is_readable() {
            return Err(UnixError::PermissionDenied);
        }
        Ok(children)
    }

    /// Names of the children plus `.` and `..`, sorted
    pub fn children_names(&self, include_hidden: bool) -> SysResult<Vec<String>> {
        let children = self.check_listable(include_hidden)?;
        let mut names: Vec<String> = children
            .iter()
            .filter(|child| include_hidden || child.is_visible())
            .map(|child| child.name.clone())
            .collect();
        names.push(THIS_DIR.to_string());
        names.push(PARENT_DIR.to_string());
        names.sort();
        Ok(names)
    }

    pub fn child(self: &Rc<Self>, name: &str, include_hidden: bool) -> SysResult<Rc<Node>> {
        let children = self.check_listable(include_hidden)?;
        match name {
            THIS_DIR => Ok(Rc::clone(self)),
            PARENT_DIR => Ok(self.parent()),
            _ => children
                .iter()
                .find(|child| child.name == name && (include_hidden || child.is_visible()))
                .cloned()
                .ok_or(UnixError::NoSuchFileOrDirectory),
        }
    }

    /// Walk `parts` starting from this node
    pub fn resolve<S: AsRef<str>>(
        self: &Rc<Self>,
        parts: &[S],
        include_hidden: bool,
    ) -> SysResult<Rc<Node>> {
        let mut current = Rc::clone(self);
        for part in parts {
            if !current.is_directory() {
                return Err(UnixError::NotADirectory);
            }
            current = current.child(part.as_ref(), include_hidden)?;
        }
        Ok(current)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::Directory(_) => "directory",
            NodeKind::File(file) => file.kind_name(),
        };
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("kind", &kind)
            .finish()
    }
}

/// A node name must be non-empty, free of `/` and not `.` or `..`
pub fn validate_name(name: &str) -> SysResult<()> {
    if name.is_empty() {
        return Err(UnixError::invalid_argument("a name must not be empty"));
    }
    if name.contains('/') {
        return Err(UnixError::invalid_argument(format!(
            "name '{}' must not contain '/'",
            name
        )));
    }
    if name == THIS_DIR || name == PARENT_DIR {
        return Err(UnixError::invalid_argument(format!(
            "name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

fn validate(description: &NodeDescription) -> SysResult<()> {
    match description {
        NodeDescription::Directory(d) => validate_directory(d),
        other => validate_name(other.name()),
    }
}

fn validate_directory(description: &DirectoryDescription) -> SysResult<()> {
    validate_name(&description.name)?;
    let mut seen = HashSet::new();
    for child in &description.children {
        validate(child)?;
        if !seen.insert(child.name()) {
            return Err(UnixError::invalid_argument(format!(
                "duplicate name '{}' in directory '{}'",
                child.name(),
                description.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_tree() -> Rc<Node> {
        Node::new_root(DirectoryDescription::new(
            "root",
            vec![
                NodeDescription::directory(
                    "home",
                    vec![
                        NodeDescription::text_file("notes.txt", "hello"),
                        NodeDescription::text_file(".profile", "secret")
                            .with_access(AccessType::Hidden),
                    ],
                ),
                NodeDescription::directory("vault", vec![NodeDescription::text_file("key", "k")])
                    .with_access(AccessType::Locked),
                NodeDescription::directory("sys", vec![]).with_access(AccessType::Hidden),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_root_is_its_own_parent() {
        let root = sample_tree();
        assert!(root.is_root());
        assert!(Rc::ptr_eq(&root.parent(), &root));
        assert_eq!(root.absolute_path(), "/");
    }

    #[test]
    fn test_absolute_path() {
        let root = sample_tree();
        let notes = root.resolve(&["home", "notes.txt"], false).unwrap();
        assert_eq!(notes.absolute_path(), "/home/notes.txt");
        assert_eq!(notes.parent().absolute_path(), "/home");
    }

    #[test]
    fn test_children_names_sorted_with_dots() {
        let root = sample_tree();
        assert_eq!(
            root.children_names(false).unwrap(),
            vec![".", "..", "home", "vault"]
        );
        assert_eq!(
            root.children_names(true).unwrap(),
            vec![".", "..", "home", "sys", "vault"]
        );
    }

    #[test]
    fn test_hidden_child_requires_privilege() {
        let root = sample_tree();
        let home = root.child("home", false).unwrap();
        assert_eq!(
            home.child(".profile", false).unwrap_err(),
            UnixError::NoSuchFileOrDirectory
        );
        assert_eq!(home.child(".profile", true).unwrap().name(), ".profile");
    }

    #[test]
    fn test_locked_directory_listed_but_unreadable() {
        let root = sample_tree();
        let vault = root.child("vault", false).unwrap();
        assert_eq!(vault.access(), AccessType::Locked);
        assert_eq!(
            vault.children_names(false).unwrap_err(),
            UnixError::PermissionDenied
        );
        assert_eq!(
            root.resolve(&["vault", "key"], false).unwrap_err(),
            UnixError::PermissionDenied
        );
        assert_eq!(root.resolve(&["vault", "key"], true).unwrap().name(), "key");
    }

    #[test]
    fn test_dot_and_dotdot() {
        let root = sample_tree();
        let home = root.resolve(&["home", ".", "..", "home"], false).unwrap();
        assert_eq!(home.absolute_path(), "/home");
        let up = root.resolve(&["..", "..", "."], false).unwrap();
        assert!(Rc::ptr_eq(&up, &root));
    }

    #[test]
    fn test_file_in_middle_of_path() {
        let root = sample_tree();
        assert_eq!(
            root.resolve(&["home", "notes.txt", "x"], false).unwrap_err(),
            UnixError::NotADirectory
        );
        let notes = root.resolve(&["home", "notes.txt"], false).unwrap();
        assert_eq!(notes.children_names(true).unwrap_err(), UnixError::NotADirectory);
        assert_eq!(notes.as_directory().unwrap_err(), UnixError::NotADirectory);
        assert!(root.as_file().is_err());
    }

    #[test]
    fn test_missing_child() {
        let root = sample_tree();
        assert_eq!(
            root.resolve(&["nope"], false).unwrap_err(),
            UnixError::NoSuchFileOrDirectory
        );
    }

    #[test]
    fn test_duplicate_siblings_rejected() {
        let result = Node::new_root(DirectoryDescription::new(
            "root",
            vec![
                NodeDescription::text_file("a", ""),
                NodeDescription::directory("a", vec![]),
            ],
        ));
        assert!(matches!(result, Err(UnixError::InvalidArgument(_))));
    }

    #[test]
    fn test_invalid_names_rejected() {
        for bad in ["", ".", "..", "a/b"] {
            let result = Node::new_root(DirectoryDescription::new(
                "root",
                vec![NodeDescription::directory(
                    "nested",
                    vec![NodeDescription::text_file(bad, "")],
                )],
            ));
            assert!(
                matches!(result, Err(UnixError::InvalidArgument(_))),
                "name {:?} should be rejected",
                bad
            );
        }
    }

    proptest! {
        #[test]
        fn prop_resolved_path_round_trips(names in prop::collection::vec("[a-z]{1,8}", 1..6)) {
            // Nest the names one inside another, then resolve the full chain
            let mut description = NodeDescription::text_file("leaf", "");
            for name in names.iter().rev() {
                description = NodeDescription::directory(name.clone(), vec![description]);
            }
            let root = Node::new_root(DirectoryDescription::new("root", vec![description])).unwrap();

            let mut parts = names.clone();
            parts.push("leaf".to_string());
            let leaf = root.resolve(&parts, false).unwrap();
            prop_assert_eq!(leaf.absolute_path(), format!("/{}", parts.join("/")));
        }

        #[test]
        fn prop_siblings_unique(names in prop::collection::vec("[a-c]{1,2}", 0..8)) {
            let children = names.iter().map(|n| NodeDescription::text_file(n.clone(), "")).collect();
            let result = Node::new_root(DirectoryDescription::new("root", children));
            let unique: HashSet<_> = names.iter().collect();
            prop_assert_eq!(result.is_ok(), unique.len() == names.len());
        }
    }
}
