//! System call dispatcher
//!
//! Routes a trapped system call to the task layer. The return value is
//! written into the caller's frame before any operation that may switch
//! tasks, since after a switch the frame belongs to the next task.

use super::{errno, SyscallNumber, SyscallResult};
use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{Machine, SyscallFrame};
use crate::process::TaskManager;
use crate::task::{CpuId, SwitchOutcome, TaskId};

/// Handle the system call in `frame` on `cpu`.
///
/// Returns the scheduler outcome when the call yielded.
pub fn dispatch_syscall<M: Machine>(
    manager: &TaskManager<M>,
    cpu: CpuId,
    frame: &mut TrapFrame,
) -> Option<SwitchOutcome> {
    let syscall_num = frame.syscall_number();
    let Some(syscall) = SyscallNumber::from_u64(syscall_num) else {
        log::warn!("Invalid syscall number: {}", syscall_num);
        frame.set_return_value(SyscallResult::Err(errno::ENOSYS).to_return_value());
        return None;
    };

    let result = match syscall {
        SyscallNumber::Fork => match manager.fork(cpu, frame) {
            Ok(child) => SyscallResult::Ok(child.as_usize() as u64),
            Err(e) => SyscallResult::Err(errno::from_task_error(e)),
        },
        SyscallNumber::Kill => {
            let target = TaskId::new(frame.arg1() as usize);
            frame.set_return_value(0);
            // Fire-and-forget; rejected kills are logged by kill itself.
            return manager.kill(cpu, target, frame).ok();
        }
        SyscallNumber::Sleep => {
            let ticks = u32::try_from(frame.arg1()).unwrap_or(u32::MAX);
            frame.set_return_value(0);
            return Some(manager.sleep(cpu, ticks, frame));
        }
        SyscallNumber::GetPid => match manager.get_current_task_id(cpu) {
            Some(id) => SyscallResult::Ok(id.as_usize() as u64),
            None => SyscallResult::Err(errno::ESRCH),
        },
        SyscallNumber::GetCid => SyscallResult::Ok(manager.get_owning_cpu_id(cpu) as u64),
        SyscallNumber::GetTicks => SyscallResult::Ok(manager.ticks()),
        SyscallNumber::GetNumFreePage => SyscallResult::Ok(manager.free_page_count() as u64),
        SyscallNumber::GetNumUsedPage => SyscallResult::Ok(manager.used_page_count() as u64),
    };

    frame.set_return_value(result.to_return_value());
    None
}
