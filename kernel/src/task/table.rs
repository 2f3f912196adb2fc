//! Task Record Store
//!
//! A fixed arena of task control blocks indexed by [`TaskId`]. The table's
//! shape (which slots are Free) only changes under the global task lock:
//! [`TaskTable::allocate`] and [`TaskTable::release`] take the locked
//! [`TableShape`] as proof.
//!
//! Once a task has been admitted to a run queue, its scheduling fields
//! belong to the owning core, which updates them without the global lock.
//! Every other core only reads them.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use super::{AtomicTaskState, CpuId, TaskId, TaskState};
use crate::arch_impl::current::TrapFrame;
use crate::error::TaskError;
use crate::memory::address_space::AddressSpace;

/// Sentinel for "not admitted to any core yet".
pub const NO_CPU: usize = usize::MAX;

/// State guarded by the global task lock.
#[derive(Debug, Default)]
pub struct TableShape {
    /// Round-robin counter for fork placement.
    pub(crate) next_cpu: usize,
    /// Whether some core already booted with the user program entry.
    pub(crate) user_entry_taken: bool,
}

/// Register state and address space of one task.
///
/// Only valid while the task is not executing; the live copy of a running
/// task's registers is the trap frame its core entered the kernel with.
#[derive(Debug, Default)]
pub struct TaskContext {
    pub trap_frame: TrapFrame,
    pub address_space: Option<AddressSpace>,
}

/// Task control block
pub struct TaskControlBlock {
    task_id: TaskId,
    state: AtomicTaskState,
    parent: AtomicUsize,
    owning_cpu: AtomicUsize,
    /// Ticks left in the slice, or ticks left to sleep while Sleeping.
    remaining_quantum: AtomicU32,
    context: Mutex<TaskContext>,
}

impl TaskControlBlock {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: AtomicTaskState::new(TaskState::Free),
            parent: AtomicUsize::new(TaskId::ROOT.as_usize()),
            owning_cpu: AtomicUsize::new(NO_CPU),
            remaining_quantum: AtomicU32::new(0),
            context: Mutex::new(TaskContext::default()),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn state(&self) -> TaskState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state);
    }

    pub fn parent(&self) -> TaskId {
        TaskId::new(self.parent.load(Ordering::Acquire))
    }

    /// The core whose run queue lists this task, once admitted.
    pub fn owning_cpu(&self) -> Option<CpuId> {
        match self.owning_cpu.load(Ordering::Acquire) {
            NO_CPU => None,
            cpu => Some(cpu),
        }
    }

    pub(crate) fn set_owning_cpu(&self, cpu: CpuId) {
        self.owning_cpu.store(cpu, Ordering::Release);
    }

    pub fn remaining_quantum(&self) -> u32 {
        self.remaining_quantum.load(Ordering::Acquire)
    }

    pub(crate) fn set_remaining_quantum(&self, ticks: u32) {
        self.remaining_quantum.store(ticks, Ordering::Release);
    }

    /// Count the quantum down by one tick and return what is left.
    pub(crate) fn consume_tick(&self) -> u32 {
        let left = self.remaining_quantum().saturating_sub(1);
        self.set_remaining_quantum(left);
        left
    }

    pub(crate) fn context(&self) -> spin::MutexGuard<'_, TaskContext> {
        self.context.lock()
    }
}

impl core::fmt::Debug for TaskControlBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskControlBlock")
            .field("task_id", &self.task_id)
            .field("state", &self.state)
            .field("parent", &self.parent())
            .field("owning_cpu", &self.owning_cpu())
            .field("remaining_quantum", &self.remaining_quantum())
            .finish()
    }
}

/// Fixed-capacity table of task control blocks.
pub struct TaskTable {
    slots: Vec<TaskControlBlock>,
}

impl TaskTable {
    /// A table of `capacity` Free slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|i| TaskControlBlock::new(TaskId::new(i))).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.slots.get(id.as_usize())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskControlBlock> {
        self.slots.iter()
    }

    /// Claim the lowest Free slot for a new task.
    ///
    /// The task starts Runnable with a full `quantum`, owned by no core.
    pub fn allocate(
        &self,
        _shape: &mut TableShape,
        parent: Option<TaskId>,
        quantum: u32,
    ) -> Result<TaskId, TaskError> {
        let slot = self
            .slots
            .iter()
            .find(|tcb| tcb.state() == TaskState::Free)
            .ok_or(TaskError::Exhausted)?;

        slot.parent
            .store(parent.unwrap_or(TaskId::ROOT).as_usize(), Ordering::Release);
        slot.owning_cpu.store(NO_CPU, Ordering::Release);
        slot.set_remaining_quantum(quantum);
        *slot.context() = TaskContext::default();
        slot.set_state(TaskState::Runnable);
        Ok(slot.task_id)
    }

    /// Return a slot to Free.
    ///
    /// The task's address space must already be torn down and its id gone
    /// from every run queue.
    pub fn release(&self, _shape: &mut TableShape, id: TaskId) {
        let Some(slot) = self.get(id) else {
            return;
        };
        debug_assert!(
            slot.context().address_space.is_none(),
            "task {} released with a live address space",
            id
        );
        slot.owning_cpu.store(NO_CPU, Ordering::Release);
        slot.set_remaining_quantum(0);
        slot.set_state(TaskState::Free);
    }

    /// Number of slots that are not Free.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|tcb| tcb.state() != TaskState::Free)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_initializes_slot() {
        let table = TaskTable::new(4);
        let mut shape = TableShape::default();

        let id = table.allocate(&mut shape, Some(TaskId::new(2)), 100).unwrap();
        let tcb = table.get(id).unwrap();
        assert_eq!(id, TaskId::new(0));
        assert_eq!(tcb.state(), TaskState::Runnable);
        assert_eq!(tcb.parent(), TaskId::new(2));
        assert_eq!(tcb.remaining_quantum(), 100);
        assert_eq!(tcb.owning_cpu(), None);
    }

    #[test]
    fn test_scan_reaches_the_last_slot() {
        let table = TaskTable::new(3);
        let mut shape = TableShape::default();
        for expected in 0..3 {
            let id = table.allocate(&mut shape, None, 1).unwrap();
            assert_eq!(id.as_usize(), expected);
        }
        assert_eq!(table.allocate(&mut shape, None, 1), Err(TaskError::Exhausted));
        assert_eq!(table.live_count(), 3);
    }

    #[test]
    fn test_released_slot_is_reused_fresh() {
        let table = TaskTable::new(2);
        let mut shape = TableShape::default();
        let first = table.allocate(&mut shape, None, 5).unwrap();
        let _second = table.allocate(&mut shape, None, 5).unwrap();

        let tcb = table.get(first).unwrap();
        tcb.set_state(TaskState::Sleeping);
        tcb.set_owning_cpu(1);
        tcb.context().trap_frame.rax = 99;

        table.release(&mut shape, first);
        assert_eq!(tcb.state(), TaskState::Free);
        assert_eq!(table.live_count(), 1);

        let reused = table.allocate(&mut shape, Some(TaskId::new(1)), 7).unwrap();
        assert_eq!(reused, first);
        assert_eq!(tcb.state(), TaskState::Runnable);
        assert_eq!(tcb.remaining_quantum(), 7);
        assert_eq!(tcb.owning_cpu(), None);
        assert_eq!(tcb.context().trap_frame, TrapFrame::default());
    }

    #[test]
    fn test_parent_defaults_to_root() {
        let table = TaskTable::new(1);
        let id = table.allocate(&mut TableShape::default(), None, 1).unwrap();
        assert_eq!(table.get(id).unwrap().parent(), TaskId::ROOT);
    }

    #[test]
    fn test_consume_tick_saturates() {
        let table = TaskTable::new(1);
        let id = table.allocate(&mut TableShape::default(), None, 2).unwrap();
        let tcb = table.get(id).unwrap();
        assert_eq!(tcb.consume_tick(), 1);
        assert_eq!(tcb.consume_tick(), 0);
        assert_eq!(tcb.consume_tick(), 0);
    }
}
