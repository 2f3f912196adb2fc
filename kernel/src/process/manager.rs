//! Task manager
//!
//! Owns everything the task layer shares between cores: the task table,
//! the per-CPU contexts, the global task lock and the machine. Scheduling
//! and lifecycle operations are implemented on [`TaskManager`] in their own
//! modules; this one holds construction and the read-only views.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{Machine, PageTableRoot};
use crate::config::TaskConfig;
use crate::error::{ConfigError, TaskError};
use crate::memory::layout::ProgramImage;
use crate::per_cpu::PerCpu;
use crate::spinlock::SpinLock;
use crate::task::table::TableShape;
use crate::task::{CpuId, TaskControlBlock, TaskId, TaskState, TaskTable};

pub struct TaskManager<M: Machine> {
    pub(crate) machine: M,
    pub(crate) config: TaskConfig,
    pub(crate) image: ProgramImage,
    pub(crate) table: TaskTable,
    pub(crate) cpus: Vec<PerCpu>,
    /// The global task lock.
    pub(crate) shape: SpinLock<TableShape>,
    /// Timer ticks seen by core 0.
    pub(crate) ticks: AtomicU64,
}

impl<M: Machine> TaskManager<M> {
    /// Build an empty task layer. No core is online until it calls
    /// [`init_cpu`](Self::init_cpu).
    pub fn new(machine: M, config: TaskConfig, image: ProgramImage) -> Result<Self, ConfigError> {
        config.validate()?;

        log::info!(
            "task manager: {} slots, {} cpus, quantum {} ticks",
            config.max_tasks,
            config.cpu_count,
            config.time_quantum
        );

        Ok(Self {
            machine,
            table: TaskTable::new(config.max_tasks),
            cpus: (0..config.cpu_count)
                .map(|_| PerCpu::new(config.max_tasks))
                .collect(),
            config,
            image,
            shape: SpinLock::new(TableShape::default()),
            ticks: AtomicU64::new(0),
        })
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub(crate) fn per_cpu(&self, cpu: CpuId) -> Result<&PerCpu, TaskError> {
        self.cpus.get(cpu).ok_or(TaskError::InvalidCpu(cpu))
    }

    /// Control block of a live task.
    pub(crate) fn live_task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.table.get(id).filter(|tcb| tcb.state() != TaskState::Free)
    }

    // =========================================================================
    // Syscall-visible queries
    // =========================================================================

    /// The task running on `cpu`.
    pub fn get_current_task_id(&self, cpu: CpuId) -> Option<TaskId> {
        self.current_task(cpu)
    }

    /// The core the calling task is owned by, which is the core it runs on.
    pub fn get_owning_cpu_id(&self, cpu: CpuId) -> CpuId {
        self.current_task(cpu)
            .and_then(|id| self.owning_cpu_of(id))
            .unwrap_or(cpu)
    }

    /// Timer ticks since boot, as counted by core 0.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn cpu_ticks(&self, cpu: CpuId) -> u64 {
        self.cpus.get(cpu).map_or(0, PerCpu::ticks)
    }

    pub fn free_page_count(&self) -> usize {
        self.machine.free_page_count()
    }

    pub fn used_page_count(&self) -> usize {
        self.machine.used_page_count()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// State of slot `id`; `None` when out of range.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.table.get(id).map(TaskControlBlock::state)
    }

    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.live_task(id).map(TaskControlBlock::parent)
    }

    pub fn owning_cpu_of(&self, id: TaskId) -> Option<CpuId> {
        self.live_task(id).and_then(TaskControlBlock::owning_cpu)
    }

    pub fn remaining_quantum_of(&self, id: TaskId) -> Option<u32> {
        self.live_task(id).map(TaskControlBlock::remaining_quantum)
    }

    pub fn current_task(&self, cpu: CpuId) -> Option<TaskId> {
        self.cpus.get(cpu).and_then(PerCpu::current)
    }

    pub fn idle_task(&self, cpu: CpuId) -> Option<TaskId> {
        self.cpus.get(cpu).and_then(PerCpu::idle_task)
    }

    pub fn run_queue_snapshot(&self, cpu: CpuId) -> Vec<TaskId> {
        self.cpus
            .get(cpu)
            .map(|per_cpu| per_cpu.run_queue().snapshot())
            .unwrap_or_default()
    }

    /// Slots that are not Free.
    pub fn live_task_count(&self) -> usize {
        self.table.live_count()
    }

    /// Entries across every core's run queue.
    pub fn queued_task_count(&self) -> usize {
        self.cpus.iter().map(|per_cpu| per_cpu.run_queue().len()).sum()
    }

    pub fn address_space_root_of(&self, id: TaskId) -> Option<PageTableRoot> {
        self.live_task(id)?
            .context()
            .address_space
            .as_ref()
            .map(|space| space.root())
    }

    /// Registers saved when `id` last left its core. Stale for a task that
    /// is currently running.
    pub fn saved_frame_of(&self, id: TaskId) -> Option<TrapFrame> {
        self.live_task(id).map(|tcb| tcb.context().trap_frame.clone())
    }

    /// Log one line per live task.
    pub fn debug_tasks(&self) {
        log::debug!("=== tasks ({} live) ===", self.live_task_count());
        for tcb in self.table.iter().filter(|tcb| tcb.state() != TaskState::Free) {
            log::debug!("  {:?}", tcb);
        }
    }
}
