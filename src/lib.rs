//! vunix - a Unix kernel surface, simulated in-process
//!
//! Design principles:
//! - Tractable: bounded complexity, comprehensible by one human
//! - Single-threaded and cooperative: programs are async bodies
//! - Unix semantics where they matter: paths, permissions, signals, wait
//!
//! Layers, leaf first:
//! - [`vfs`]: the node tree, files, paths, pipes, execution contexts
//! - [`kernel`]: executor, signals, processes and the process table
//! - [`boot`]: configuration-driven startup

pub mod boot;
pub mod config;
pub mod error;
pub mod kernel;
pub mod vfs;

pub use boot::System;
pub use config::Config;
pub use error::{ProcessError, ProcessResult, SysResult, UnixError};
