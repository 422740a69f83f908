//! The kernel - task execution, processes and signals
//!
//! - One cooperative executor per thread, reached through free functions
//! - Processes are async bodies driven by that executor
//! - Signals are delivered synchronously inside the sender's `send_signal`

pub mod executor;
pub mod handle;
pub mod process;
pub mod program;
pub mod signal;
pub mod table;
pub mod task;
pub mod timer;

pub use executor::Executor;
pub use handle::{
    DirectoryProxy, ExecTarget, Executed, FileProxy, NodeProxy, OpenFile, ProcessHandle,
};
pub use process::{Pgid, Pid, ProcessState};
pub use program::{Executable, ExecutableGenerator, IntoExitCode, SignalHandler};
pub use signal::{DefaultAction, Signal};
pub use table::{INIT_PID, INIT_PPID, ProcessTable};
pub use task::{TaskId, yield_now};
pub use timer::{Sleep, TimerQueue, sleep};

use std::future::Future;

thread_local! {
    /// The kernel instance for this thread
    static KERNEL: Kernel = Kernel::new();
}

/// The kernel owns the executor (and, through it, the timers)
pub struct Kernel {
    executor: Executor,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a task on this thread's executor
pub fn spawn<F>(future: F) -> TaskId
where
    F: Future<Output = ()> + 'static,
{
    KERNEL.with(|k| k.executor.spawn(future))
}

/// Spawn a task and run it up to its first suspension point
pub(crate) fn spawn_eager<F>(future: F) -> TaskId
where
    F: Future<Output = ()> + 'static,
{
    KERNEL.with(|k| k.executor.spawn_eager(future))
}

/// Run this thread's executor until `future` completes
///
/// Must not be called from inside a task.
pub fn block_on<F>(future: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    KERNEL.with(|k| k.executor.block_on(future))
}

/// Number of live tasks on this thread's executor
pub fn task_count() -> usize {
    KERNEL.with(|k| k.executor.task_count())
}

/// Number of timers still waiting to fire
pub fn pending_timers() -> usize {
    with_timers(|timers| timers.len())
}

pub(crate) fn with_timers<R>(f: impl FnOnce(&mut TimerQueue) -> R) -> R {
    KERNEL.with(|k| f(&mut k.executor.timers.borrow_mut()))
}

/// Like `with_timers`, but a no-op while the thread is shutting down
pub(crate) fn try_with_timers(f: impl FnOnce(&mut TimerQueue)) {
    let _ = KERNEL.try_with(|k| {
        if let Ok(mut timers) = k.executor.timers.try_borrow_mut() {
            f(&mut timers);
        }
    });
}
