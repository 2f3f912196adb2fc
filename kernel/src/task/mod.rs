//! Task records, per-CPU run queues and the round-robin scheduler.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

pub mod run_queue;
pub mod scheduler;
pub mod table;

pub use run_queue::RunQueue;
pub use scheduler::SwitchOutcome;
pub use table::{TaskContext, TaskControlBlock, TaskTable};

/// Identifier of a core.
pub type CpuId = usize;

/// Stable task identifier: the index of the task's slot in the task table.
///
/// An id is reused only after its slot has gone back to [`TaskState::Free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    /// Parent id recorded for tasks created with no current task (idle tasks).
    pub const ROOT: TaskId = TaskId(0);

    pub const fn new(id: usize) -> Self {
        TaskId(id)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Slot is unused
    Free = 0,
    /// Eligible for selection by its core's scheduler
    Runnable = 1,
    /// Currently executing on its owning core
    Running = 2,
    /// Waiting for its countdown to reach zero
    Sleeping = 3,
}

impl TaskState {
    /// Whether the round-robin scan may pick a task in this state.
    pub fn is_eligible(self) -> bool {
        matches!(self, TaskState::Runnable | TaskState::Running)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TaskState::Runnable,
            2 => TaskState::Running,
            3 => TaskState::Sleeping,
            _ => TaskState::Free,
        }
    }
}

/// A [`TaskState`] that can be read by any core and written by its owner.
pub struct AtomicTaskState(AtomicU8);

impl AtomicTaskState {
    pub const fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl fmt::Debug for AtomicTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}
