//! Task-layer configuration
//!
//! Compile-time defaults for the task table, scheduler quantum and user
//! stack geometry, plus the runtime [`TaskConfig`] a [`TaskManager`] is
//! built from.
//!
//! [`TaskManager`]: crate::process::TaskManager

use x86_64::VirtAddr;

use crate::error::ConfigError;

// =============================================================================
// Defaults
// =============================================================================

/// Number of slots in the task table.
pub const NR_TASKS: usize = 10;

/// Number of cores brought up by default.
pub const NCPU: usize = 4;

/// Upper bound on cores the task layer can track.
pub const MAX_CPUS: usize = 8;

/// Timer ticks a task may run before the scheduler reconsiders.
pub const TIME_QUANT: u32 = 100;

/// Standard page size (4 KiB).
pub const PAGE_SIZE: u64 = 4096;

/// Top of every task's user stack. The stack grows down from here.
pub const USER_STACK_TOP: u64 = 0x7FFF_FFFF_0000;

/// Size of every task's user stack (10 pages).
pub const USER_STACK_SIZE: u64 = 10 * PAGE_SIZE;

// =============================================================================
// Runtime configuration
// =============================================================================

/// Runtime parameters of the task layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Capacity `N` of the task table.
    pub max_tasks: usize,
    /// Number of cores that own a run queue.
    pub cpu_count: usize,
    /// Length of a scheduling slice in timer ticks.
    pub time_quantum: u32,
    /// Highest address (exclusive) of the user stack.
    pub user_stack_top: VirtAddr,
    /// Size of the user stack in bytes.
    pub user_stack_size: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_tasks: NR_TASKS,
            cpu_count: NCPU,
            time_quantum: TIME_QUANT,
            user_stack_top: VirtAddr::new(USER_STACK_TOP),
            user_stack_size: USER_STACK_SIZE,
        }
    }
}

impl TaskConfig {
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    pub fn with_time_quantum(mut self, ticks: u32) -> Self {
        self.time_quantum = ticks;
        self
    }

    pub fn with_user_stack(mut self, top: VirtAddr, size: u64) -> Self {
        self.user_stack_top = top;
        self.user_stack_size = size;
        self
    }

    /// Lowest address of the user stack.
    pub fn user_stack_bottom(&self) -> VirtAddr {
        self.user_stack_top - self.user_stack_size
    }

    /// Number of pages backing the user stack.
    pub fn user_stack_pages(&self) -> u64 {
        self.user_stack_size / PAGE_SIZE
    }

    /// Check the configuration before any state is built from it.
    ///
    /// Every core boots with a task of its own, so the table must hold at
    /// least one task per core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_count == 0 {
            return Err(ConfigError::NoCpus);
        }
        if self.cpu_count > MAX_CPUS {
            return Err(ConfigError::TooManyCpus);
        }
        if self.max_tasks < self.cpu_count {
            return Err(ConfigError::TooFewTasks);
        }
        if self.time_quantum == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.user_stack_size == 0 {
            return Err(ConfigError::EmptyStack);
        }
        if self.user_stack_size % PAGE_SIZE != 0
            || !self.user_stack_top.is_aligned(PAGE_SIZE)
            || self.user_stack_top.as_u64() < self.user_stack_size
        {
            return Err(ConfigError::UnalignedStack);
        }
        Ok(())
    }
}
