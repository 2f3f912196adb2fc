//! Per-CPU scheduling context
//!
//! Each core owns one [`PerCpu`]: the task it is running, its idle task
//! (if it booted into one), its run queue and a tick counter. Only the owning core writes these
//! fields. The run queue mutex is contended only by fork admission from
//! other cores.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};

use crate::task::{RunQueue, TaskId};

const NO_TASK: usize = usize::MAX;

pub struct PerCpu {
    online: AtomicBool,
    /// Task whose registers are live on this core.
    current: AtomicUsize,
    /// Task started at the idle entry; the boot core's first task runs the
    /// user program instead and leaves this unset.
    idle_task: AtomicUsize,
    ticks: AtomicU64,
    run_queue: Mutex<RunQueue>,
}

impl PerCpu {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            online: AtomicBool::new(false),
            current: AtomicUsize::new(NO_TASK),
            idle_task: AtomicUsize::new(NO_TASK),
            ticks: AtomicU64::new(0),
            run_queue: Mutex::new(RunQueue::new(queue_capacity)),
        }
    }

    pub fn current(&self) -> Option<TaskId> {
        decode(self.current.load(Ordering::Acquire))
    }

    pub(crate) fn set_current(&self, task: Option<TaskId>) {
        self.current.store(encode(task), Ordering::Release);
    }

    pub fn idle_task(&self) -> Option<TaskId> {
        decode(self.idle_task.load(Ordering::Acquire))
    }

    pub(crate) fn set_idle_task(&self, task: TaskId) {
        self.idle_task.store(task.as_usize(), Ordering::Release);
    }

    /// Whether `init_cpu` has run on this core.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub(crate) fn set_online(&self) {
        self.online.store(true, Ordering::Release);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn run_queue(&self) -> MutexGuard<'_, RunQueue> {
        self.run_queue.lock()
    }
}

fn encode(task: Option<TaskId>) -> usize {
    task.map_or(NO_TASK, TaskId::as_usize)
}

fn decode(raw: usize) -> Option<TaskId> {
    match raw {
        NO_TASK => None,
        id => Some(TaskId::new(id)),
    }
}
