//! kill()
//!
//! A core may only kill tasks in its own run queue, and never its idle
//! task. Killing the running task is the usual self-termination path; the
//! core switches to the kernel root before the address space goes away and
//! forgets the task as current, so the scheduler does not save registers
//! into a slot that may already be reused.

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{CpuOps, Machine, PageTableOps};
use crate::error::TaskError;
use crate::memory::address_space;
use crate::process::TaskManager;
use crate::task::{CpuId, SwitchOutcome, TaskId, TaskState};

impl<M: Machine> TaskManager<M> {
    /// Kill `target` from `cpu`, then yield.
    ///
    /// Rejected targets leave every task untouched and do not yield.
    pub fn kill(&self, cpu: CpuId, target: TaskId, frame: &mut TrapFrame) -> Result<SwitchOutcome, TaskError> {
        let per_cpu = self.per_cpu(cpu)?;

        let Some(tcb) = self.table.get(target) else {
            log::debug!("kill: task {} out of range", target);
            return Err(TaskError::InvalidTarget(target));
        };
        if tcb.state() == TaskState::Free
            || tcb.owning_cpu() != Some(cpu)
            || per_cpu.idle_task() == Some(target)
        {
            log::debug!(
                "kill: cpu {} may not kill task {} ({:?} on {:?})",
                cpu,
                target,
                tcb.state(),
                tcb.owning_cpu()
            );
            return Err(TaskError::InvalidTarget(target));
        }

        per_cpu.run_queue().remove(target);
        if per_cpu.current() == Some(target) {
            per_cpu.set_current(None);
            self.machine.load_root(cpu, self.machine.kernel_root());
        }

        {
            let mut shape = self.shape.lock(cpu);
            let space = tcb.context().address_space.take();
            if let Some(space) = space {
                address_space::destroy(&self.machine, space, cpu, &self.config);
            }
            self.table.release(&mut shape, target);
        }

        log::info!("task {} killed on cpu {}", target, cpu);
        Ok(self.yield_to_next(cpu, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch_impl::FrameAllocator;
    use crate::arch_impl::hosted::HostedMachine;
    use crate::config::TaskConfig;

    fn booted(cpus: usize) -> (TaskManager<HostedMachine>, alloc::vec::Vec<TrapFrame>) {
        let machine = HostedMachine::new(cpus, 1024);
        let image = machine.program_image();
        let config = TaskConfig::default().with_cpu_count(cpus);
        let manager = TaskManager::new(machine, config, image).unwrap();
        let frames = (0..cpus).map(|cpu| manager.init_cpu(cpu).unwrap()).collect();
        (manager, frames)
    }

    #[test]
    fn test_self_kill_frees_slot_and_switches() {
        let (manager, mut frames) = booted(1);
        let child = manager.fork(0, &mut frames[0]).unwrap();
        manager.yield_to_next(0, &mut frames[0]);
        assert_eq!(manager.current_task(0), Some(child));

        let used_with_child = manager.machine().used_page_count();
        let outcome = manager.kill(0, child, &mut frames[0]).unwrap();
        assert_eq!(
            outcome,
            SwitchOutcome::Switched {
                from: None,
                to: TaskId::new(0)
            }
        );
        assert_eq!(manager.task_state(child), Some(TaskState::Free));
        assert_eq!(manager.run_queue_snapshot(0), [TaskId::new(0)]);
        assert!(manager.machine().used_page_count() < used_with_child);
        assert_eq!(
            manager.machine().active_root(0),
            manager.address_space_root_of(TaskId::new(0))
        );
    }

    #[test]
    fn test_kill_of_other_local_task_keeps_caller_running() {
        let (manager, mut frames) = booted(1);
        let child = manager.fork(0, &mut frames[0]).unwrap();
        let loads = manager.machine().root_loads(0);

        let outcome = manager.kill(0, child, &mut frames[0]).unwrap();
        assert_eq!(outcome, SwitchOutcome::Continued(TaskId::new(0)));
        assert_eq!(manager.machine().root_loads(0), loads);
        assert_eq!(manager.live_task_count(), 1);
    }

    #[test]
    fn test_rejected_targets() {
        let (manager, mut frames) = booted(2);
        let child = manager.fork(0, &mut frames[0]).unwrap();
        assert_eq!(manager.owning_cpu_of(child), Some(1));

        // Owned elsewhere, free, out of range
        let cases = [child, TaskId::new(1), TaskId::new(9), TaskId::new(42)];
        for target in cases {
            assert_eq!(
                manager.kill(0, target, &mut frames[0]),
                Err(TaskError::InvalidTarget(target))
            );
        }
        // cpu 1's idle task, from its own core
        assert_eq!(
            manager.kill(1, TaskId::new(1), &mut frames[1]),
            Err(TaskError::InvalidTarget(TaskId::new(1)))
        );
        assert_eq!(manager.task_state(child), Some(TaskState::Runnable));
        assert_eq!(manager.run_queue_snapshot(1), [TaskId::new(1), child]);
        assert_eq!(manager.live_task_count(), 3);
    }

    #[test]
    fn test_killing_the_last_boot_core_task_halts_the_core() {
        let (manager, mut frames) = booted(1);
        let boot_task = TaskId::new(0);

        let outcome = manager.kill(0, boot_task, &mut frames[0]).unwrap();
        assert_eq!(outcome, SwitchOutcome::Halted);
        assert_eq!(manager.task_state(boot_task), Some(TaskState::Free));
        assert_eq!(manager.current_task(0), None);
        assert_eq!(manager.live_task_count(), 0);
        assert_eq!(manager.machine().live_space_count(), 0);
        assert_eq!(manager.machine().active_root(0), Some(manager.machine().kernel_root()));
        assert_eq!(manager.timer_tick(0, &mut frames[0]), None);
    }
}
