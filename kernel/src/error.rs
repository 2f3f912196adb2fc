//! Error types for the task layer

use core::fmt;

use x86_64::VirtAddr;

use crate::task::{CpuId, TaskId};

/// Failure reported by the physical page allocator or page-table primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// No physical frame was available.
    OutOfMemory,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfMemory => write!(f, "out of physical memory"),
        }
    }
}

/// Which address space was missing a stack page during a fork copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopySide {
    Parent,
    Child,
}

/// Failure of a lifecycle operation.
///
/// None of these is fatal to the kernel: each one aborts only the operation
/// that hit it and leaves the task table consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// No free slot in the task table.
    Exhausted,
    /// A page allocation failed while building or cloning an address space.
    OutOfMemory,
    /// An expected user stack page was not mapped while cloning.
    AddressSpaceCorrupt {
        task: TaskId,
        addr: VirtAddr,
        side: CopySide,
    },
    /// Kill target out of range, free, idle, or owned by another core.
    InvalidTarget(TaskId),
    /// CPU id out of range, or a core booted twice.
    InvalidCpu(CpuId),
}

impl From<MemoryError> for TaskError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfMemory => TaskError::OutOfMemory,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Exhausted => write!(f, "task table exhausted"),
            TaskError::OutOfMemory => write!(f, "out of memory"),
            TaskError::AddressSpaceCorrupt { task, addr, side } => write!(
                f,
                "AddressSpaceCorrupt: {:?} stack page {:#x} missing while cloning task {}",
                side,
                addr.as_u64(),
                task
            ),
            TaskError::InvalidTarget(id) => write!(f, "invalid target task {}", id),
            TaskError::InvalidCpu(cpu) => write!(f, "invalid cpu {}", cpu),
        }
    }
}

/// Rejected [`TaskConfig`](crate::config::TaskConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NoCpus,
    TooManyCpus,
    /// Fewer task slots than cores; every core boots with one task.
    TooFewTasks,
    ZeroQuantum,
    EmptyStack,
    UnalignedStack,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::NoCpus => "at least one CPU is required",
            ConfigError::TooManyCpus => "CPU count exceeds MAX_CPUS",
            ConfigError::TooFewTasks => "task table smaller than CPU count",
            ConfigError::ZeroQuantum => "time quantum must be non-zero",
            ConfigError::EmptyStack => "user stack size must be non-zero",
            ConfigError::UnalignedStack => "user stack must be page aligned",
        };
        f.write_str(msg)
    }
}
