//! Process table
//!
//! Owns every process from start to reap: PID allocation, process groups,
//! the foreground group, signal routing and orphan reparenting.
//!
//! The table is seeded with init (PID 1). It never exits, ignores every
//! signal and adopts orphans.

use super::process::{Pgid, Pid, Process, ProcessParams, ProcessState};
use super::signal::Signal;
use crate::error::{ProcessResult, SysResult, UnixError};
use crate::vfs::{ExecutionContext, Node};
use futures::future::join_all;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const INIT_PID: Pid = Pid(1);
pub const INIT_PPID: Pid = Pid(0);

pub(crate) struct TableInner {
    processes: RefCell<BTreeMap<Pid, Rc<Process>>>,
    next_pid: Cell<u32>,
    foreground: Cell<Pgid>,
}

/// Shared handle to the process table
#[derive(Clone)]
pub struct ProcessTable {
    inner: Rc<TableInner>,
}

impl ProcessTable {
    /// A table holding only init, which runs in `init_context`
    pub fn new(init_context: ExecutionContext) -> Self {
        let inner = Rc::new_cyclic(|table| {
            let init = Process::init(table.clone(), init_context);
            TableInner {
                processes: RefCell::new(BTreeMap::from([(INIT_PID, init)])),
                next_pid: Cell::new(INIT_PID.0 + 1),
                foreground: Cell::new(Pgid::from_pid(INIT_PID)),
            }
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<TableInner>) -> Self {
        Self { inner }
    }

    pub fn process(&self, pid: Pid) -> SysResult<Rc<Process>> {
        self.inner
            .processes
            .borrow()
            .get(&pid)
            .cloned()
            .ok_or(UnixError::NoSuchProcess)
    }

    /// Start `file` as a child of `parent` (init when `None`), in the
    /// parent's process group and with a copy of its context
    pub fn start_process<I, S>(&self, parent: Option<Pid>, file: &Rc<Node>, args: I) -> SysResult<Pid>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent = self.process(parent.unwrap_or(INIT_PID))?;
        let executable = file.executable()?;

        let pid = Pid(self.inner.next_pid.get());
        self.inner.next_pid.set(pid.0 + 1);

        let context = parent.context().clone();
        let process = Process::new(ProcessParams {
            pid,
            ppid: parent.pid(),
            pgid: parent.pgid(),
            file: Rc::clone(file),
            context,
            executable: Some(executable),
            table: Rc::downgrade(&self.inner),
        });
        self.inner
            .processes
            .borrow_mut()
            .insert(pid, Rc::clone(&process));

        process.start(args.into_iter().map(Into::into).collect())?;
        Ok(pid)
    }

    /// Wait for `pid` to become a zombie, then reap it
    pub async fn wait_to_finish(&self, pid: Pid) -> ProcessResult<i32> {
        if pid == INIT_PID {
            return Err(UnixError::internal("init never exits").into());
        }
        let process = self.process(pid)?;
        let result = process.wait_to_finish().await;
        self.reap(pid);
        result
    }

    /// Drop a zombie's entry and hand its children to init
    fn reap(&self, pid: Pid) {
        let mut processes = self.inner.processes.borrow_mut();
        if processes.remove(&pid).is_none() {
            return;
        }
        for child in processes.values().filter(|p| p.ppid() == pid) {
            log::debug!("{} reparented to init", child.pid());
            child.set_ppid(INIT_PID);
        }
        log::debug!("{} reaped", pid);
    }

    pub async fn send_signal(&self, pid: Pid, signal: Signal) -> ProcessResult<()> {
        let process = self.process(pid)?;
        process.send_signal(signal).await
    }

    /// Signal every member of a group (the foreground group when `None`)
    /// concurrently. All deliveries finish before the first error is
    /// returned.
    pub async fn send_group_signal(&self, pgid: Option<Pgid>, signal: Signal) -> ProcessResult<()> {
        let pgid = pgid.unwrap_or_else(|| self.foreground_pgid());
        let members: Vec<Rc<Process>> = self
            .inner
            .processes
            .borrow()
            .values()
            .filter(|p| p.pgid() == pgid)
            .cloned()
            .collect();
        log::debug!("{} -> {} ({} processes)", signal, pgid, members.len());

        let results = join_all(members.iter().map(|p| p.send_signal(signal))).await;
        results.into_iter().collect()
    }

    pub fn update_process_group(&self, pid: Pid, pgid: Pgid) -> SysResult<()> {
        self.process(pid)?.set_pgid(pgid);
        Ok(())
    }

    pub fn foreground_pgid(&self) -> Pgid {
        self.inner.foreground.get()
    }

    pub fn set_foreground_pgid(&self, pgid: Pgid) {
        self.inner.foreground.set(pgid);
    }

    pub fn state(&self, pid: Pid) -> SysResult<ProcessState> {
        Ok(self.process(pid)?.state())
    }

    pub fn ppid(&self, pid: Pid) -> SysResult<Pid> {
        Ok(self.process(pid)?.ppid())
    }

    pub fn pgid(&self, pid: Pid) -> SysResult<Pgid> {
        Ok(self.process(pid)?.pgid())
    }

    /// PIDs of every process not yet reaped, ascending
    pub fn pids(&self) -> Vec<Pid> {
        self.inner.processes.borrow().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.processes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTable")
            .field("processes", &self.inner.processes.borrow().values().collect::<Vec<_>>())
            .field("foreground", &self.inner.foreground.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Executable, block_on};
    use crate::vfs::{DirectoryDescription, FilePermission, NodeDescription};
    use crate::error::ProcessError;

    fn setup() -> (ProcessTable, Rc<Node>) {
        let root = Node::new_root(DirectoryDescription::new(
            "root",
            vec![
                NodeDescription::directory("home", vec![]),
                NodeDescription::binary_file("noop", || Executable::new(|_, _| async { Ok(()) }))
                    .with_permissions(FilePermission::Execute),
                NodeDescription::binary_file("plain", || Executable::new(|_, _| async { Ok(()) })),
            ],
        ))
        .unwrap();
        let context = ExecutionContext::new(Rc::clone(&root), [("HOME", "/home")]).unwrap();
        (ProcessTable::new(context), root)
    }

    #[test]
    fn test_init_seeded() {
        let (table, _) = setup();
        assert_eq!(table.pids(), vec![INIT_PID]);
        assert_eq!(table.ppid(INIT_PID).unwrap(), INIT_PPID);
        assert_eq!(table.pgid(INIT_PID).unwrap(), Pgid(1));
        assert_eq!(table.foreground_pgid(), Pgid(1));
    }

    #[test]
    fn test_pids_allocated_from_two() {
        let (table, root) = setup();
        let noop = root.child("noop", false).unwrap();
        let first = table.start_process(None, &noop, Vec::<String>::new()).unwrap();
        let second = table.start_process(None, &noop, Vec::<String>::new()).unwrap();
        assert_eq!(first, Pid(2));
        assert_eq!(second, Pid(3));
        assert_eq!(table.ppid(first).unwrap(), INIT_PID);
        assert_eq!(table.pgid(second).unwrap(), Pgid(1));
    }

    #[test]
    fn test_non_executable_rejected() {
        let (table, root) = setup();
        let plain = root.child("plain", false).unwrap();
        assert_eq!(
            table.start_process(None, &plain, Vec::<String>::new()).unwrap_err(),
            UnixError::PermissionDenied
        );
        assert_eq!(
            table.start_process(None, &root, Vec::<String>::new()).unwrap_err(),
            UnixError::IsADirectory
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_wait_reaps() {
        let (table, root) = setup();
        let noop = root.child("noop", false).unwrap();
        let pid = table.start_process(None, &noop, Vec::<String>::new()).unwrap();
        let waiter = table.clone();
        assert_eq!(block_on(async move { waiter.wait_to_finish(pid).await }).unwrap(), 0);
        assert_eq!(table.state(pid).unwrap_err(), UnixError::NoSuchProcess);
        assert_eq!(table.pids(), vec![INIT_PID]);
    }

    #[test]
    fn test_unknown_pid() {
        let (table, _) = setup();
        let waiter = table.clone();
        let result = block_on(async move { waiter.wait_to_finish(Pid(42)).await });
        assert!(matches!(result, Err(ProcessError::System(UnixError::NoSuchProcess))));
        let sender = table.clone();
        let result = block_on(async move { sender.send_signal(Pid(42), Signal::SIGINT).await });
        assert!(matches!(result, Err(ProcessError::System(UnixError::NoSuchProcess))));
        assert_eq!(
            table.update_process_group(Pid(42), Pgid(2)).unwrap_err(),
            UnixError::NoSuchProcess
        );
    }

    #[test]
    fn test_waiting_on_init_fails() {
        let (table, _) = setup();
        let result = block_on(async move { table.wait_to_finish(INIT_PID).await });
        assert!(matches!(result, Err(ProcessError::System(UnixError::Internal(_)))));
    }

    #[test]
    fn test_process_groups() {
        let (table, root) = setup();
        let noop = root.child("noop", false).unwrap();
        let pid = table.start_process(None, &noop, Vec::<String>::new()).unwrap();
        table.update_process_group(pid, Pgid::from_pid(pid)).unwrap();
        assert_eq!(table.pgid(pid).unwrap(), Pgid(2));
        table.set_foreground_pgid(Pgid(2));
        assert_eq!(table.foreground_pgid(), Pgid(2));
    }
}
