//! Process and task layer of a small SMP x86_64 kernel.
//!
//! A fixed table of tasks, one round-robin run queue per core, per-task
//! address spaces, and the fork/kill/sleep lifecycle on top. The machine
//! underneath (frame allocator, page tables, per-core root register) is
//! reached through the traits in [`arch_impl`]; [`arch_impl::hosted`]
//! provides a simulated machine.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch_impl;
pub mod config;
pub mod error;
pub mod logger;
pub mod memory;
pub mod per_cpu;
pub mod process;
pub mod spinlock;
pub mod syscall;
pub mod task;

pub use config::TaskConfig;
pub use error::{ConfigError, MemoryError, TaskError};
pub use process::TaskManager;
pub use task::{CpuId, SwitchOutcome, TaskId, TaskState};
