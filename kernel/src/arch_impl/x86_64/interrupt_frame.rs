//! Saved user register state.
//!
//! The trap entry stub pushes a [`TrapFrame`] on kernel entry and pops it on
//! the way out. Whatever frame is in place when a handler returns is the one
//! the core resumes, so replacing the frame is how the scheduler switches
//! tasks.

use x86_64::VirtAddr;

use super::constants::{DEFAULT_USER_RFLAGS, USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::arch_impl::traits::SyscallFrame;

/// Full register and segment snapshot of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    pub ds: u64,
    pub es: u64,

    // Hardware interrupt frame, popped by iretq
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Frame for a task that has never run: zeroed registers, user
    /// selectors, interrupts enabled, stack pointer at `stack_top`.
    pub fn new_user(entry: VirtAddr, stack_top: VirtAddr) -> Self {
        let data = USER_DATA_SELECTOR as u64;
        TrapFrame {
            ds: data,
            es: data,
            ss: data,
            cs: USER_CODE_SELECTOR as u64,
            rflags: DEFAULT_USER_RFLAGS,
            rip: entry.as_u64(),
            rsp: stack_top.as_u64(),
            ..TrapFrame::default()
        }
    }

    pub fn instruction_pointer(&self) -> u64 {
        self.rip
    }

    pub fn stack_pointer(&self) -> u64 {
        self.rsp
    }

    pub fn set_instruction_pointer(&mut self, addr: VirtAddr) {
        self.rip = addr.as_u64();
    }

    /// Whether the frame resumes at ring 3.
    pub fn is_from_userspace(&self) -> bool {
        self.cs & 3 == 3
    }
}

impl SyscallFrame for TrapFrame {
    fn syscall_number(&self) -> u64 {
        self.rax
    }

    fn arg1(&self) -> u64 {
        self.rdi
    }

    fn arg2(&self) -> u64 {
        self.rsi
    }

    fn arg3(&self) -> u64 {
        self.rdx
    }

    fn set_return_value(&mut self, value: u64) {
        self.rax = value;
    }

    fn return_value(&self) -> u64 {
        self.rax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_frame_enters_ring3_with_interrupts_enabled() {
        let frame = TrapFrame::new_user(VirtAddr::new(0x4000_0000), VirtAddr::new(0x7fff_ffff_0000));
        assert!(frame.is_from_userspace());
        assert_eq!(frame.cs, 0x1b);
        assert_eq!(frame.ss, 0x23);
        assert_eq!(frame.ds, 0x23);
        assert_eq!(frame.rflags & (1 << 9), 1 << 9);
        assert_eq!(frame.instruction_pointer(), 0x4000_0000);
        assert_eq!(frame.stack_pointer(), 0x7fff_ffff_0000);
        assert_eq!(frame.rax, 0);
    }

    #[test]
    fn test_syscall_registers() {
        let mut frame = TrapFrame {
            rax: 5,
            rdi: 1,
            rsi: 2,
            rdx: 3,
            ..TrapFrame::default()
        };
        assert_eq!(frame.syscall_number(), 5);
        assert_eq!((frame.arg1(), frame.arg2(), frame.arg3()), (1, 2, 3));
        frame.set_return_value(42);
        assert_eq!(frame.return_value(), 42);
    }
}
