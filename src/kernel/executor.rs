//! Async executor for cooperative multitasking
//!
//! Single-threaded, tick-based:
//! - Task identity (tasks have IDs, woken individually)
//! - Proper wake semantics (no busy-waiting while timers are pending)
//! - Spawning from inside a running task is always allowed
//! - `block_on` drives everything until one future completes
//!
//! All state sits behind shared references so tasks can call back into the
//! executor (spawn, sleep) while it is mid-tick.

use super::task::{BoxFuture, TaskId};
use super::timer::TimerQueue;
use futures::task::{ArcWake, waker};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Waker};
use std::time::Instant;

type ReadySet = Arc<Mutex<BTreeSet<TaskId>>>;

fn lock(ready: &Mutex<BTreeSet<TaskId>>) -> MutexGuard<'_, BTreeSet<TaskId>> {
    ready.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A task managed by the executor
struct ManagedTask {
    id: TaskId,
    future: BoxFuture,
}

/// Marks its task ready when woken
struct TaskWaker {
    id: TaskId,
    ready: ReadySet,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        lock(&arc_self.ready).insert(arc_self.id);
    }
}

pub struct Executor {
    /// All tasks, indexed by ID. A task is absent while it is being polled.
    tasks: RefCell<BTreeMap<TaskId, ManagedTask>>,

    /// Tasks that are ready to be polled (signaled by waker)
    ready: ReadySet,

    /// Tasks waiting to be integrated (added during tick)
    pending_spawn: RefCell<VecDeque<ManagedTask>>,

    /// Next task ID
    next_id: Cell<u64>,

    pub(crate) timers: RefCell<TimerQueue>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            tasks: RefCell::new(BTreeMap::new()),
            ready: Arc::new(Mutex::new(BTreeSet::new())),
            pending_spawn: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
            timers: RefCell::new(TimerQueue::new()),
        }
    }

    fn next_task_id(&self) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        id
    }

    /// Spawn a future, returns its task ID. It first runs on the next tick.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.next_task_id();
        self.pending_spawn.borrow_mut().push_back(ManagedTask {
            id,
            future: Box::pin(future),
        });
        lock(&self.ready).insert(id);
        id
    }

    /// Spawn a future and poll it once right away, so it runs up to its
    /// first suspension point before the caller continues.
    pub fn spawn_eager<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.next_task_id();
        let mut task = ManagedTask {
            id,
            future: Box::pin(future),
        };
        let waker = self.create_waker(id);
        let mut cx = Context::from_waker(&waker);
        if task.future.as_mut().poll(&mut cx).is_pending() {
            self.pending_spawn.borrow_mut().push_back(task);
        }
        id
    }

    /// Integrate pending spawns into the task map
    fn integrate_pending(&self) {
        let mut pending = self.pending_spawn.borrow_mut();
        let mut tasks = self.tasks.borrow_mut();
        while let Some(task) = pending.pop_front() {
            tasks.insert(task.id, task);
        }
    }

    /// Run one tick of execution
    ///
    /// Polls all ready tasks once, in ID order.
    /// Returns the number of tasks that were polled.
    pub fn tick(&self) -> usize {
        // First, integrate any tasks spawned since last tick
        self.integrate_pending();

        let ready_ids = std::mem::take(&mut *lock(&self.ready));
        let mut polled = 0;

        for task_id in ready_ids {
            // Remove while polling so the task can reach the executor
            let Some(mut task) = self.tasks.borrow_mut().remove(&task_id) else {
                continue;
            };

            let waker = self.create_waker(task_id);
            let mut cx = Context::from_waker(&waker);
            polled += 1;

            if task.future.as_mut().poll(&mut cx).is_pending() {
                // Put it back, NOT in the ready set; its waker does that
                self.tasks.borrow_mut().insert(task_id, task);
            }
        }

        // Integrate any tasks spawned during this tick
        self.integrate_pending();

        polled
    }

    /// Fire expired timers
    fn fire_timers(&self) {
        let wakers = self.timers.borrow_mut().expire(Instant::now());
        for waker in wakers {
            waker.wake();
        }
    }

    /// Drive every task until `future` completes, returning its output.
    ///
    /// When nothing is ready the thread sleeps until the next timer. With no
    /// timer either, every task is polled again so futures that yield
    /// without arranging a wakeup still make progress.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);
        self.spawn(async move {
            let value = future.await;
            *slot.borrow_mut() = Some(value);
        });

        loop {
            self.fire_timers();
            self.tick();

            if let Some(value) = output.borrow_mut().take() {
                return value;
            }

            if lock(&self.ready).is_empty() {
                let next = self.timers.borrow().next_deadline();
                match next {
                    Some(deadline) => {
                        let now = Instant::now();
                        if deadline > now {
                            std::thread::sleep(deadline - now);
                        }
                    }
                    None => self.wake_all(),
                }
            }
        }
    }

    fn wake_all(&self) {
        let tasks = self.tasks.borrow();
        lock(&self.ready).extend(tasks.keys().copied());
    }

    /// Check if there are any active tasks
    pub fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty() || !self.pending_spawn.borrow().is_empty()
    }

    /// Get count of active tasks
    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len() + self.pending_spawn.borrow().len()
    }

    /// Create a waker that marks a task as ready
    fn create_waker(&self, task_id: TaskId) -> Waker {
        waker(Arc::new(TaskWaker {
            id: task_id,
            ready: Arc::clone(&self.ready),
        }))
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::task::yield_now;

    #[test]
    fn test_spawn_and_tick() {
        let executor = Executor::new();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        executor.spawn(async move { flag.set(true) });
        assert_eq!(executor.task_count(), 1);
        assert_eq!(executor.tick(), 1);
        assert!(ran.get());
        assert!(!executor.has_tasks());
    }

    #[test]
    fn test_pending_task_not_repolled_without_wake() {
        let executor = Executor::new();
        executor.spawn(futures::future::pending::<()>());
        assert_eq!(executor.tick(), 1);
        assert_eq!(executor.tick(), 0);
        assert!(executor.has_tasks());
    }

    #[test]
    fn test_yield_requeues() {
        let executor = Executor::new();
        let steps = Rc::new(Cell::new(0));
        let counter = Rc::clone(&steps);
        executor.spawn(async move {
            counter.set(1);
            yield_now().await;
            counter.set(2);
        });
        executor.tick();
        assert_eq!(steps.get(), 1);
        executor.tick();
        assert_eq!(steps.get(), 2);
    }

    #[test]
    fn test_spawn_eager_runs_to_first_suspension() {
        let executor = Executor::new();
        let steps = Rc::new(Cell::new(0));
        let counter = Rc::clone(&steps);
        executor.spawn_eager(async move {
            counter.set(1);
            yield_now().await;
            counter.set(2);
        });
        assert_eq!(steps.get(), 1);
        executor.tick();
        assert_eq!(steps.get(), 2);
    }

    #[test]
    fn test_spawn_eager_completed_task_is_not_kept() {
        let executor = Executor::new();
        executor.spawn_eager(async {});
        assert!(!executor.has_tasks());
    }

    #[test]
    fn test_block_on_returns_output() {
        let executor = Executor::new();
        let value = executor.block_on(async {
            yield_now().await;
            21 * 2
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_spawn_during_tick() {
        let executor = Rc::new(Executor::new());
        let inner = Rc::clone(&executor);
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        executor.block_on(async move {
            inner.spawn(async move { flag.set(true) });
            yield_now().await;
            yield_now().await;
        });
        assert!(seen.get());
    }
}
