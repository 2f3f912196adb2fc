//! Task lifecycle: creation, per-CPU boot, fork, kill and sleep.
//!
//! Every operation is a method on [`TaskManager`] taking the id of the core
//! it runs on and, where it may switch tasks, the core's live trap frame.

pub mod creation;
pub mod fork;
pub mod kill;
pub mod manager;
pub mod sleep;

pub use manager::TaskManager;
