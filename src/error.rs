//! Error taxonomy
//!
//! Two layers, mirroring how a real kernel reports problems:
//! - [`UnixError`]: errno-style failures raised by the kernel itself
//!   (filesystem, process table, misuse of the API)
//! - [`ProcessError`]: what a running program can unwind with, either a
//!   clean exit, a kernel error it did not handle, or an arbitrary fault

use std::rc::Rc;
use thiserror::Error;

/// Kernel error, each variant mapping to a familiar errno value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnixError {
    /// Caller misuse (double start, operating on a process that never ran)
    #[error("internal error: {0}")]
    Internal(String),
    /// Malformed name, malformed home path, duplicate sibling
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Access type or permission bits forbid the operation
    #[error("permission denied")]
    PermissionDenied,
    #[error("no such file or directory")]
    NoSuchFileOrDirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("no such process")]
    NoSuchProcess,
}

impl UnixError {
    pub fn internal(message: impl Into<String>) -> Self {
        UnixError::Internal(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        UnixError::InvalidArgument(message.into())
    }

    /// The errno number (0 for internal errors, which have no Unix equivalent)
    pub fn errno(&self) -> i32 {
        match self {
            UnixError::Internal(_) => 0,
            UnixError::NoSuchFileOrDirectory => 2,
            UnixError::NoSuchProcess => 3,
            UnixError::PermissionDenied => 13,
            UnixError::NotADirectory => 20,
            UnixError::IsADirectory => 21,
            UnixError::InvalidArgument(_) => 22,
        }
    }

    /// The symbolic errno name, e.g. `EACCES`
    pub fn name(&self) -> &'static str {
        match self {
            UnixError::Internal(_) => "EINTERNAL",
            UnixError::InvalidArgument(_) => "EINVAL",
            UnixError::PermissionDenied => "EACCES",
            UnixError::NoSuchFileOrDirectory => "ENOENT",
            UnixError::NotADirectory => "ENOTDIR",
            UnixError::IsADirectory => "EISDIR",
            UnixError::NoSuchProcess => "ESRCH",
        }
    }
}

pub type SysResult<T> = Result<T, UnixError>;

/// A fault raised by program code with nothing more than a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProgramFault(pub String);

/// How a program (or one of its signal handlers) unwinds
///
/// `Clone` because a stored fault is handed to every caller that waits on
/// the process; the fault itself is shared, never re-wrapped.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// Clean unwind carrying an exit code
    #[error("exited with code {0}")]
    Exit(i32),
    /// A kernel error the program did not handle
    #[error(transparent)]
    System(#[from] UnixError),
    /// Any other failure, kept verbatim
    #[error("{0}")]
    Fault(Rc<dyn std::error::Error>),
}

impl ProcessError {
    /// Wrap an arbitrary error as a program fault
    pub fn fault<E: std::error::Error + 'static>(error: E) -> Self {
        ProcessError::Fault(Rc::new(error))
    }

    /// A program fault carrying only a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::fault(ProgramFault(message.into()))
    }

    /// The exit code, if this is a clean exit
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Exit(code) => Some(*code),
            _ => None,
        }
    }

    /// The kernel error, if this is one
    pub fn as_unix(&self) -> Option<&UnixError> {
        match self {
            ProcessError::System(e) => Some(e),
            _ => None,
        }
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(UnixError::PermissionDenied.errno(), 13);
        assert_eq!(UnixError::PermissionDenied.name(), "EACCES");
        assert_eq!(UnixError::NoSuchFileOrDirectory.errno(), 2);
        assert_eq!(UnixError::NotADirectory.name(), "ENOTDIR");
        assert_eq!(UnixError::IsADirectory.errno(), 21);
        assert_eq!(UnixError::NoSuchProcess.name(), "ESRCH");
        assert_eq!(UnixError::invalid_argument("x").errno(), 22);
        assert_eq!(UnixError::internal("x").name(), "EINTERNAL");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            UnixError::invalid_argument("bad name").to_string(),
            "invalid argument: bad name"
        );
        assert_eq!(ProcessError::msg("I failed").to_string(), "I failed");
        assert_eq!(
            ProcessError::from(UnixError::PermissionDenied).to_string(),
            "permission denied"
        );
    }

    #[test]
    fn test_fault_is_shared_on_clone() {
        let err = ProcessError::msg("boom");
        let copy = err.clone();
        match (err, copy) {
            (ProcessError::Fault(a), ProcessError::Fault(b)) => assert!(Rc::ptr_eq(&a, &b)),
            other => panic!("expected faults, got {:?}", other),
        }
    }

    #[test]
    fn test_exit_code_accessor() {
        assert_eq!(ProcessError::Exit(42).exit_code(), Some(42));
        assert_eq!(ProcessError::msg("x").exit_code(), None);
        assert_eq!(
            ProcessError::from(UnixError::NoSuchProcess).as_unix(),
            Some(&UnixError::NoSuchProcess)
        );
    }
}
