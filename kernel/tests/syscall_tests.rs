//! The syscall boundary as user code sees it: numbers in RAX, results back
//! in RAX of whichever task resumes.

mod common;

use tasklab::arch_impl::current::TrapFrame;
use tasklab::syscall::{dispatch_syscall, errno, SyscallNumber};
use tasklab::{SwitchOutcome, TaskConfig, TaskId};

fn trap(booted: &mut common::Booted, cpu: usize, number: SyscallNumber, arg: u64) -> Option<SwitchOutcome> {
    let frame: &mut TrapFrame = &mut booted.frames[cpu];
    frame.rax = number as u64;
    frame.rdi = arg;
    dispatch_syscall(&booted.manager, cpu, frame)
}

#[test]
fn test_fork_returns_child_id_to_parent_and_zero_to_child() {
    let mut booted = common::boot_cpus(1);
    booted.frames[0].rcx = 0x77;

    assert_eq!(trap(&mut booted, 0, SyscallNumber::Fork, 0), None);
    let child = booted.frames[0].rax;
    assert_eq!(child, 1);

    // Parent yields; the child resumes at the same point with RAX = 0
    assert_eq!(
        trap(&mut booted, 0, SyscallNumber::Sleep, 0),
        Some(SwitchOutcome::Switched {
            from: Some(TaskId::new(0)),
            to: TaskId::new(1)
        })
    );
    assert_eq!(booted.frames[0].rax, 0);
    assert_eq!(booted.frames[0].rcx, 0x77);

    trap(&mut booted, 0, SyscallNumber::GetPid, 0);
    assert_eq!(booted.frames[0].rax, child);
}

#[test]
fn test_getcid_reports_the_owning_core() {
    let mut booted = common::boot_cpus(3);
    for cpu in 0..3 {
        trap(&mut booted, cpu, SyscallNumber::GetCid, 0);
        assert_eq!(booted.frames[cpu].rax, cpu as u64);
    }
}

#[test]
fn test_kill_self_resumes_another_task() {
    let mut booted = common::boot_cpus(1);
    trap(&mut booted, 0, SyscallNumber::Fork, 0);
    trap(&mut booted, 0, SyscallNumber::Sleep, 0);
    trap(&mut booted, 0, SyscallNumber::GetPid, 0);
    let me = booted.frames[0].rax;
    assert_eq!(me, 1);

    let outcome = trap(&mut booted, 0, SyscallNumber::Kill, me);
    assert_eq!(
        outcome,
        Some(SwitchOutcome::Switched {
            from: None,
            to: TaskId::new(0)
        })
    );
    // The parent sees the return value of its own last call (sleep)
    assert_eq!(booted.frames[0].rax, 0);
    assert_eq!(booted.manager.live_task_count(), 1);
}

#[test]
fn test_error_values() {
    let mut booted = common::boot(TaskConfig::default().with_cpu_count(1).with_max_tasks(1));
    trap(&mut booted, 0, SyscallNumber::Fork, 0);
    assert_eq!(booted.frames[0].rax as i64, -(errno::EAGAIN as i64));

    let mut roomy = common::boot(TaskConfig::default().with_cpu_count(1));
    roomy.manager.machine().fail_allocations_after(0);
    trap(&mut roomy, 0, SyscallNumber::Fork, 0);
    assert_eq!(roomy.frames[0].rax as i64, -(errno::ENOMEM as i64));

    booted.frames[0].rax = 12345;
    dispatch_syscall(&booted.manager, 0, &mut booted.frames[0]);
    assert_eq!(booted.frames[0].rax as i64, -(errno::ENOSYS as i64));
}

#[test]
fn test_page_and_tick_counters() {
    let mut booted = common::boot_cpus(1);
    trap(&mut booted, 0, SyscallNumber::GetNumUsedPage, 0);
    let used = booted.frames[0].rax;
    trap(&mut booted, 0, SyscallNumber::GetNumFreePage, 0);
    let free = booted.frames[0].rax;
    assert_eq!((used + free) as usize, common::FRAMES);

    trap(&mut booted, 0, SyscallNumber::Fork, 0);
    trap(&mut booted, 0, SyscallNumber::GetNumUsedPage, 0);
    assert!(booted.frames[0].rax > used);

    for _ in 0..7 {
        booted.manager.timer_tick(0, &mut booted.frames[0]);
    }
    trap(&mut booted, 0, SyscallNumber::GetTicks, 0);
    assert_eq!(booted.frames[0].rax, 7);
}
