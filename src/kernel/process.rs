//! Process abstraction
//!
//! A process is an executable body bound to an execution context and run
//! as a task on the executor. State is derived, never stored:
//!
//! - exit result present        -> Zombie
//! - never started              -> Spawn
//! - stopped flag set           -> Stopped
//! - otherwise                  -> Running
//!
//! Inspired by the Linux process model:
//! - Process groups (pgid) for job control
//! - Parent/child relationships, orphans reparented to init
//! - Wait/reap semantics for zombie processes

use super::handle::ProcessHandle;
use super::program::{Executable, ExecuteFn, SignalHandler};
use super::signal::{DefaultAction, Signal};
use super::table::{INIT_PID, ProcessTable, TableInner};
use crate::error::{ProcessError, ProcessResult, SysResult, UnixError};
use crate::vfs::file::{FileContent, FileNode};
use crate::vfs::{AccessType, ExecutionContext, FilePermission, Node};
use futures::future::{FutureExt, LocalBoxFuture};
use pin_project_lite::pin_project;
use slab::Slab;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// Process group identifier (for job control)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pgid(pub u32);

impl Pgid {
    /// Create a PGID from a PID (new process group)
    pub fn from_pid(pid: Pid) -> Self {
        Pgid(pid.0)
    }
}

impl fmt::Display for Pgid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pgid:{}", self.0)
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, body not started yet
    Spawn,
    Running,
    /// Stopped by signal; incoming signals are queued
    Stopped,
    /// Finished, holding its exit result until reaped
    Zombie,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Spawn => "spawn",
            ProcessState::Running => "running",
            ProcessState::Stopped => "stopped",
            ProcessState::Zombie => "zombie",
        };
        f.write_str(name)
    }
}

pub(crate) struct ProcessParams {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pgid,
    pub file: Rc<Node>,
    pub context: ExecutionContext,
    /// `None` for init, which never runs a body
    pub executable: Option<Executable>,
    pub table: Weak<TableInner>,
}

/// Wakers of the futures waiting on a process, one slot per future.
/// A future keeps its slot until it completes or is dropped.
#[derive(Default)]
struct Waiters {
    wakers: RefCell<Slab<Waker>>,
}

impl Waiters {
    /// Store `waker` in the future's slot, claiming one on first use
    fn register(&self, slot: &mut Option<usize>, waker: &Waker) {
        let mut wakers = self.wakers.borrow_mut();
        if let Some(current) = slot.and_then(|key| wakers.get_mut(key)) {
            if !current.will_wake(waker) {
                *current = waker.clone();
            }
            return;
        }
        *slot = Some(wakers.insert(waker.clone()));
    }

    fn release(&self, slot: &mut Option<usize>) {
        if let Some(key) = slot.take() {
            self.wakers.borrow_mut().try_remove(key);
        }
    }

    fn wake_all(&self) {
        let wakers: Vec<Waker> = self.wakers.borrow().iter().map(|(_, w)| w.clone()).collect();
        for waker in wakers {
            waker.wake();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.wakers.borrow().len()
    }
}

pub struct Process {
    pid: Pid,
    ppid: Cell<Pid>,
    pgid: Cell<Pgid>,
    file: Rc<Node>,
    context: RefCell<ExecutionContext>,
    table: Weak<TableInner>,

    /// Taken on start
    body: RefCell<Option<ExecuteFn>>,
    catch_all: RefCell<Option<SignalHandler>>,
    handlers: RefCell<HashMap<Signal, SignalHandler>>,

    started: Cell<bool>,
    stopped: Cell<bool>,
    exit: RefCell<Option<ProcessResult<i32>>>,
    /// Signals received while stopped, redelivered on resume
    pending: RefCell<VecDeque<Signal>>,

    body_waker: RefCell<Option<Waker>>,
    exit_waiters: Waiters,
    resume_waiters: Waiters,
}

impl Process {
    pub(crate) fn new(params: ProcessParams) -> Rc<Self> {
        let (body, catch_all) = match params.executable {
            Some(Executable {
                execute,
                signal_handler,
            }) => (Some(execute), signal_handler),
            None => (None, None),
        };
        Rc::new(Self {
            pid: params.pid,
            ppid: Cell::new(params.ppid),
            pgid: Cell::new(params.pgid),
            file: params.file,
            context: RefCell::new(params.context),
            table: params.table,
            body: RefCell::new(body),
            catch_all: RefCell::new(catch_all),
            handlers: RefCell::new(HashMap::new()),
            started: Cell::new(false),
            stopped: Cell::new(false),
            exit: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            body_waker: RefCell::new(None),
            exit_waiters: Waiters::default(),
            resume_waiters: Waiters::default(),
        })
    }

    /// The init process: running from the start, with no body to run
    pub(crate) fn init(table: Weak<TableInner>, context: ExecutionContext) -> Rc<Self> {
        let placeholder = FileNode::new(
            FilePermission::Execute,
            FileContent::Text(RefCell::new(String::new())),
        );
        let file = Node::detached_file("init", AccessType::Hidden, placeholder, context.root());
        let process = Self::new(ProcessParams {
            pid: INIT_PID,
            ppid: super::table::INIT_PPID,
            pgid: Pgid::from_pid(INIT_PID),
            file,
            context,
            executable: None,
            table,
        });
        process.started.set(true);
        process
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn ppid(&self) -> Pid {
        self.ppid.get()
    }

    pub(crate) fn set_ppid(&self, ppid: Pid) {
        self.ppid.set(ppid);
    }

    pub fn pgid(&self) -> Pgid {
        self.pgid.get()
    }

    pub(crate) fn set_pgid(&self, pgid: Pgid) {
        self.pgid.set(pgid);
    }

    /// The file this process was started from
    pub fn file(&self) -> &Rc<Node> {
        &self.file
    }

    pub fn state(&self) -> ProcessState {
        if self.exit.borrow().is_some() {
            ProcessState::Zombie
        } else if !self.started.get() {
            ProcessState::Spawn
        } else if self.stopped.get() {
            ProcessState::Stopped
        } else {
            ProcessState::Running
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ProcessState::Stopped
    }

    /// The exit code or fault, once the process is a zombie
    pub fn exit_result(&self) -> Option<ProcessResult<i32>> {
        self.exit.borrow().clone()
    }

    pub(crate) fn context(&self) -> Ref<'_, ExecutionContext> {
        self.context.borrow()
    }

    pub(crate) fn context_mut(&self) -> RefMut<'_, ExecutionContext> {
        self.context.borrow_mut()
    }

    pub(crate) fn table(&self) -> SysResult<ProcessTable> {
        self.table
            .upgrade()
            .map(ProcessTable::from_inner)
            .ok_or_else(|| UnixError::internal("the process table is gone"))
    }

    pub fn handle(self: &Rc<Self>) -> ProcessHandle {
        ProcessHandle::new(Rc::clone(self))
    }

    /// What a checkpoint unwinds with once the process is a zombie
    pub(crate) fn interruption(&self) -> Option<ProcessError> {
        self.exit.borrow().as_ref().map(|result| match result {
            Ok(code) => ProcessError::Exit(*code),
            Err(e) => e.clone(),
        })
    }

    pub(crate) fn check_alive(&self) -> ProcessResult<()> {
        match self.interruption() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run the body with argv `[absolute path, args...]`
    ///
    /// The body runs up to its first suspension point before this returns.
    pub fn start(self: &Rc<Self>, args: Vec<String>) -> SysResult<()> {
        if self.state() != ProcessState::Spawn {
            return Err(UnixError::internal(format!("{} was already started", self.pid)));
        }
        let body = self
            .body
            .borrow_mut()
            .take()
            .ok_or_else(|| UnixError::internal(format!("{} has no body", self.pid)))?;
        self.started.set(true);

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.file.absolute_path());
        argv.extend(args);
        log::debug!("{} started: {}", self.pid, argv.join(" "));

        let future = Interruptible {
            body: body(self.handle(), argv),
            process: Rc::downgrade(self),
        };
        let process = Rc::clone(self);
        super::spawn_eager(async move {
            if let Some(outcome) = future.await {
                process.finish(outcome);
            }
        });
        Ok(())
    }

    /// Turn into a zombie. Later outcomes are ignored.
    pub(crate) fn finish(&self, outcome: ProcessResult<i32>) {
        if self.exit.borrow().is_some() {
            return;
        }
        let result = match outcome {
            Err(ProcessError::Exit(code)) => Ok(code),
            other => other,
        };
        match &result {
            Ok(code) => log::debug!("{} exited with code {}", self.pid, code),
            Err(e) => log::warn!("{} faulted: {}", self.pid, e),
        }
        *self.exit.borrow_mut() = Some(result);
        self.stopped.set(false);
        self.pending.borrow_mut().clear();
        self.handlers.borrow_mut().clear();
        self.catch_all.borrow_mut().take();

        self.wake_body();
        self.exit_waiters.wake_all();
        self.resume_waiters.wake_all();
    }

    pub fn stop(&self) {
        if self.state() == ProcessState::Running {
            log::debug!("{} stopped", self.pid);
            self.stopped.set(true);
        }
    }

    /// Continue a stopped process, then redeliver the signals it queued
    /// while stopped, oldest first. Returns the first handler fault.
    pub fn resume(self: &Rc<Self>) -> LocalBoxFuture<'static, ProcessResult<()>> {
        let process = Rc::clone(self);
        async move {
            if !process.is_stopped() {
                return Ok(());
            }
            process.stopped.set(false);
            log::debug!("{} resumed", process.pid);
            process.wake_body();
            process.resume_waiters.wake_all();

            let mut first_error = None;
            while process.state() == ProcessState::Running {
                let next = process.pending.borrow_mut().pop_front();
                let Some(signal) = next else {
                    break;
                };
                if let Err(e) = process.send_signal(signal).await {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
        .boxed_local()
    }

    pub fn register_signal_handler(&self, signal: Signal, handler: SignalHandler) -> SysResult<()> {
        if !signal.can_catch() {
            return Err(UnixError::invalid_argument(format!(
                "{} cannot be caught",
                signal
            )));
        }
        self.handlers.borrow_mut().insert(signal, handler);
        Ok(())
    }

    fn handler_for(&self, signal: Signal) -> Option<SignalHandler> {
        let registered = self.handlers.borrow().get(&signal).cloned();
        registered.or_else(|| self.catch_all.borrow().clone())
    }

    /// Deliver a signal. Handlers run to completion before this resolves.
    pub fn send_signal(self: &Rc<Self>, signal: Signal) -> LocalBoxFuture<'static, ProcessResult<()>> {
        let process = Rc::clone(self);
        async move {
            match process.state() {
                ProcessState::Spawn => {
                    return Err(UnixError::internal(format!(
                        "{} cannot receive {} before it starts",
                        process.pid, signal
                    ))
                    .into());
                }
                ProcessState::Zombie => return Ok(()),
                _ => {}
            }
            if process.pid == INIT_PID {
                log::trace!("init ignores {}", signal);
                return Ok(());
            }
            log::debug!("{} <- {}", process.pid, signal);

            match signal {
                Signal::SIGKILL => {
                    process.finish(Ok(signal.exit_code()));
                    Ok(())
                }
                Signal::SIGSTOP => {
                    process.stop();
                    Ok(())
                }
                Signal::SIGCONT => {
                    process.resume().await?;
                    if process.handler_for(signal).is_some() {
                        process.dispatch(signal).await
                    } else {
                        Ok(())
                    }
                }
                _ if process.is_stopped() => {
                    process.pending.borrow_mut().push_back(signal);
                    Ok(())
                }
                _ => process.dispatch(signal).await,
            }
        }
        .boxed_local()
    }

    /// Run the handler for `signal`, or its default action
    async fn dispatch(self: Rc<Self>, signal: Signal) -> ProcessResult<()> {
        if self.state() == ProcessState::Zombie {
            return Ok(());
        }
        match self.handler_for(signal) {
            Some(handler) => match handler(self.handle(), signal).await {
                Err(ProcessError::Exit(code)) => {
                    self.finish(Ok(code));
                    Ok(())
                }
                other => other,
            },
            None => match signal.default_action() {
                DefaultAction::Terminate => {
                    self.finish(Ok(signal.exit_code()));
                    Ok(())
                }
                DefaultAction::Ignore => Ok(()),
                DefaultAction::Stop => {
                    self.stop();
                    Ok(())
                }
                DefaultAction::Continue => self.resume().await,
            },
        }
    }

    /// Resolves with the exit result once the process is a zombie
    pub fn wait_to_finish(self: &Rc<Self>) -> WaitExit {
        WaitExit {
            process: Rc::clone(self),
            slot: None,
        }
    }

    /// Yield once, wait while stopped, unwind once a zombie
    pub(crate) fn checkpoint(self: &Rc<Self>) -> Checkpoint {
        Checkpoint {
            process: Rc::clone(self),
            slot: None,
            yielded: false,
        }
    }

    fn wake_body(&self) {
        if let Some(waker) = self.body_waker.borrow_mut().take() {
            waker.wake();
        }
    }

    fn set_body_waker(&self, waker: &Waker) {
        let mut slot = self.body_waker.borrow_mut();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("ppid", &self.ppid.get())
            .field("pgid", &self.pgid.get())
            .field("state", &self.state())
            .finish()
    }
}

pin_project! {
    /// Polls a process body only while the process is running. Once the
    /// process is a zombie the body is dropped unfinished.
    struct Interruptible<F> {
        #[pin]
        body: F,
        process: Weak<Process>,
    }
}

impl<F: Future> Future for Interruptible<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let Some(process) = this.process.upgrade() else {
            return Poll::Ready(None);
        };
        match process.state() {
            ProcessState::Zombie => return Poll::Ready(None),
            ProcessState::Stopped => {
                process.set_body_waker(cx.waker());
                return Poll::Pending;
            }
            _ => {}
        }
        match this.body.poll(cx) {
            Poll::Ready(output) => Poll::Ready(Some(output)),
            Poll::Pending => {
                process.set_body_waker(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// Future returned by [`Process::wait_to_finish`]
#[must_use = "futures do nothing unless polled"]
pub struct WaitExit {
    process: Rc<Process>,
    slot: Option<usize>,
}

impl Future for WaitExit {
    type Output = ProcessResult<i32>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.process.state() == ProcessState::Spawn {
            return Poll::Ready(Err(UnixError::internal(format!(
                "{} has not started",
                this.process.pid
            ))
            .into()));
        }
        match this.process.exit_result() {
            Some(result) => {
                this.process.exit_waiters.release(&mut this.slot);
                Poll::Ready(result)
            }
            None => {
                this.process.exit_waiters.register(&mut this.slot, cx.waker());
                Poll::Pending
            }
        }
    }
}

impl Drop for WaitExit {
    fn drop(&mut self) {
        self.process.exit_waiters.release(&mut self.slot);
    }
}

/// Future returned by [`Process::checkpoint`]
#[must_use = "futures do nothing unless polled"]
pub(crate) struct Checkpoint {
    process: Rc<Process>,
    slot: Option<usize>,
    yielded: bool,
}

impl Future for Checkpoint {
    type Output = ProcessResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(e) = this.process.interruption() {
            this.process.resume_waiters.release(&mut this.slot);
            return Poll::Ready(Err(e));
        }
        if this.process.is_stopped() {
            this.process.resume_waiters.register(&mut this.slot, cx.waker());
            return Poll::Pending;
        }
        this.process.resume_waiters.release(&mut this.slot);
        if !this.yielded {
            this.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for Checkpoint {
    fn drop(&mut self) {
        self.process.resume_waiters.release(&mut self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{self, sleep};
    use crate::vfs::{DirectoryDescription, NodeDescription};
    use std::time::Duration;

    fn table_with(binary: NodeDescription) -> (ProcessTable, Rc<Node>) {
        let root = Node::new_root(DirectoryDescription::new(
            "root",
            vec![
                NodeDescription::directory("home", vec![]),
                binary.with_permissions(FilePermission::Execute),
            ],
        ))
        .unwrap();
        let file = root.resolve(&["bin"], false).unwrap();
        let context = ExecutionContext::new(root, [("HOME", "/home")]).unwrap();
        (ProcessTable::new(context), file)
    }

    async fn nap(_process: ProcessHandle, _args: Vec<String>) -> ProcessResult<()> {
        sleep(Duration::from_millis(5)).await;
        Ok(())
    }

    #[test]
    fn test_display() {
        assert_eq!(Pid(7).to_string(), "pid:7");
        assert_eq!(Pgid::from_pid(Pid(7)), Pgid(7));
        assert_eq!(ProcessState::Zombie.to_string(), "zombie");
    }

    #[test]
    fn test_state_transitions() {
        let (table, bin) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let pid = table.start_process(None, &bin, Vec::<String>::new()).unwrap();
        let process = table.process(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Running);

        process.stop();
        assert_eq!(process.state(), ProcessState::Stopped);

        let resumed = Rc::clone(&process);
        kernel::block_on(async move { resumed.resume().await }).unwrap();
        assert_eq!(process.state(), ProcessState::Running);

        let waiting = Rc::clone(&process);
        assert_eq!(kernel::block_on(async move { waiting.wait_to_finish().await }).unwrap(), 0);
        assert_eq!(process.state(), ProcessState::Zombie);
    }

    #[test]
    fn test_double_start_rejected() {
        let (table, bin) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let pid = table.start_process(None, &bin, Vec::<String>::new()).unwrap();
        let process = table.process(pid).unwrap();
        assert!(matches!(process.start(vec![]), Err(UnixError::Internal(_))));
    }

    #[test]
    fn test_uncatchable_signals() {
        let (table, bin) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let pid = table.start_process(None, &bin, Vec::<String>::new()).unwrap();
        let process = table.process(pid).unwrap();
        let handler = crate::kernel::program::signal_handler(|_, _| async { Ok(()) });
        assert!(matches!(
            process.register_signal_handler(Signal::SIGKILL, Rc::clone(&handler)),
            Err(UnixError::InvalidArgument(_))
        ));
        assert!(matches!(
            process.register_signal_handler(Signal::SIGSTOP, Rc::clone(&handler)),
            Err(UnixError::InvalidArgument(_))
        ));
        assert!(process.register_signal_handler(Signal::SIGTSTP, handler).is_ok());
    }

    #[test]
    fn test_finish_is_final() {
        let (table, bin) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let pid = table.start_process(None, &bin, Vec::<String>::new()).unwrap();
        let process = table.process(pid).unwrap();
        process.finish(Ok(3));
        process.finish(Ok(4));
        assert_eq!(process.exit_result().unwrap().unwrap(), 3);
        assert!(matches!(process.check_alive(), Err(ProcessError::Exit(3))));
    }

    #[test]
    fn test_init_ignores_signals() {
        let (table, _) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let init = table.process(INIT_PID).unwrap();
        assert_eq!(init.state(), ProcessState::Running);
        kernel::block_on(async move { init.send_signal(Signal::SIGKILL).await }).unwrap();
        assert_eq!(table.state(INIT_PID).unwrap(), ProcessState::Running);
    }

    #[test]
    fn test_init_has_no_body() {
        let (table, _) = table_with(NodeDescription::binary_file("bin", || Executable::new(nap)));
        let init = table.process(INIT_PID).unwrap();
        assert!(init.body.borrow().is_none());
        assert!(init.catch_all.borrow().is_none());
        assert_eq!(init.file().absolute_path(), "/init");
        assert!(matches!(init.start(vec![]), Err(UnixError::Internal(_))));
    }

    #[test]
    fn test_waiters_hold_one_slot_each() {
        async fn hang(_process: ProcessHandle, _args: Vec<String>) -> ProcessResult<()> {
            futures::future::pending::<()>().await;
            Ok(())
        }
        let (table, bin) = table_with(NodeDescription::binary_file("bin", || Executable::new(hang)));
        let pid = table.start_process(None, &bin, Vec::<String>::new()).unwrap();
        let process = table.process(pid).unwrap();
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut first = Box::pin(process.wait_to_finish());
        let mut second = Box::pin(process.wait_to_finish());
        for _ in 0..500 {
            assert!(first.as_mut().poll(&mut cx).is_pending());
            assert!(second.as_mut().poll(&mut cx).is_pending());
        }
        assert_eq!(process.exit_waiters.len(), 2);
        drop(second);
        assert_eq!(process.exit_waiters.len(), 1);

        process.stop();
        let mut checkpoint = Box::pin(process.checkpoint());
        for _ in 0..500 {
            assert!(checkpoint.as_mut().poll(&mut cx).is_pending());
        }
        assert_eq!(process.resume_waiters.len(), 1);

        process.finish(Ok(9));
        assert!(matches!(
            checkpoint.as_mut().poll(&mut cx),
            Poll::Ready(Err(ProcessError::Exit(9)))
        ));
        assert_eq!(process.resume_waiters.len(), 0);
        assert!(matches!(first.as_mut().poll(&mut cx), Poll::Ready(Ok(9))));
        assert_eq!(process.exit_waiters.len(), 0);
    }
}
