//! POSIX errno values
//!
//! Error codes returned by the task-layer system calls.

use crate::error::TaskError;

/// No such process
pub const ESRCH: i32 = 3;

/// Try again (task table full)
pub const EAGAIN: i32 = 11;

/// Out of memory
pub const ENOMEM: i32 = 12;

/// Bad address
pub const EFAULT: i32 = 14;

/// Invalid argument
pub const EINVAL: i32 = 22;

/// Function not implemented (used by syscall dispatcher)
pub const ENOSYS: i32 = 38;

/// Errno reported for a failed lifecycle operation.
pub fn from_task_error(err: TaskError) -> i32 {
    match err {
        TaskError::Exhausted => EAGAIN,
        TaskError::OutOfMemory => ENOMEM,
        TaskError::AddressSpaceCorrupt { .. } => EFAULT,
        TaskError::InvalidTarget(_) => ESRCH,
        TaskError::InvalidCpu(_) => EINVAL,
    }
}
