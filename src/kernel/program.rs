//! Executables
//!
//! A binary file carries a generator; every process started from it calls
//! the generator once and gets a fresh [`Executable`]: the async body plus an
//! optional catch-all signal handler.

use super::handle::ProcessHandle;
use super::signal::Signal;
use crate::error::ProcessResult;
use futures::future::{FutureExt, LocalBoxFuture};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// The body of a program: handle and argv in, exit code out
pub type ExecuteFn = Box<dyn FnOnce(ProcessHandle, Vec<String>) -> LocalBoxFuture<'static, ProcessResult<i32>>>;

/// Runs inside the sender's `send_signal` call
pub type SignalHandler = Rc<dyn Fn(ProcessHandle, Signal) -> LocalBoxFuture<'static, ProcessResult<()>>>;

pub type ExecutableGenerator = Rc<dyn Fn() -> Executable>;

/// What a body's successful result turns into
pub trait IntoExitCode {
    fn into_exit_code(self) -> i32;
}

impl IntoExitCode for () {
    fn into_exit_code(self) -> i32 {
        0
    }
}

impl IntoExitCode for i32 {
    fn into_exit_code(self) -> i32 {
        self
    }
}

impl IntoExitCode for Option<i32> {
    fn into_exit_code(self) -> i32 {
        self.unwrap_or(0)
    }
}

pub struct Executable {
    pub(crate) execute: ExecuteFn,
    pub(crate) signal_handler: Option<SignalHandler>,
}

impl Executable {
    pub fn new<F, Fut, T>(body: F) -> Self
    where
        F: FnOnce(ProcessHandle, Vec<String>) -> Fut + 'static,
        Fut: Future<Output = ProcessResult<T>> + 'static,
        T: IntoExitCode,
    {
        Self {
            execute: Box::new(move |process, args| {
                body(process, args)
                    .map(|result| result.map(IntoExitCode::into_exit_code))
                    .boxed_local()
            }),
            signal_handler: None,
        }
    }

    /// Handle every signal that has no handler of its own
    pub fn with_signal_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ProcessHandle, Signal) -> Fut + 'static,
        Fut: Future<Output = ProcessResult<()>> + 'static,
    {
        self.signal_handler = Some(signal_handler(handler));
        self
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("catches_signals", &self.signal_handler.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn signal_handler<F, Fut>(handler: F) -> SignalHandler
where
    F: Fn(ProcessHandle, Signal) -> Fut + 'static,
    Fut: Future<Output = ProcessResult<()>> + 'static,
{
    Rc::new(move |process, signal| handler(process, signal).boxed_local())
}
