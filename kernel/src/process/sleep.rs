//! sleep()
//!
//! The sleeping task's quantum becomes its wake-up countdown; the timer
//! tick on its core counts it down and makes it Runnable at zero. There is
//! no early wake-up.

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::Machine;
use crate::process::TaskManager;
use crate::task::{CpuId, SwitchOutcome, TaskState};

impl<M: Machine> TaskManager<M> {
    /// Put the task running on `cpu` to sleep for `ticks` timer ticks and
    /// yield.
    ///
    /// `ticks == 0` and sleeping from the idle task are plain yields.
    pub fn sleep(&self, cpu: CpuId, ticks: u32, frame: &mut TrapFrame) -> SwitchOutcome {
        let Some(per_cpu) = self.cpus.get(cpu) else {
            return SwitchOutcome::Halted;
        };

        if let Some(current) = per_cpu.current() {
            if ticks > 0 && per_cpu.idle_task() != Some(current) {
                if let Some(tcb) = self.table.get(current) {
                    tcb.set_remaining_quantum(ticks);
                    tcb.set_state(TaskState::Sleeping);
                    log::trace!("cpu {}: task {} sleeps {} ticks", cpu, current, ticks);
                }
            }
        }

        self.yield_to_next(cpu, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch_impl::hosted::HostedMachine;
    use crate::config::TaskConfig;
    use crate::task::TaskId;

    fn booted() -> (TaskManager<HostedMachine>, TrapFrame) {
        let machine = HostedMachine::new(1, 1024);
        let image = machine.program_image();
        let config = TaskConfig::default().with_cpu_count(1);
        let manager = TaskManager::new(machine, config, image).unwrap();
        let frame = manager.init_cpu(0).unwrap();
        (manager, frame)
    }

    #[test]
    fn test_idle_task_never_sleeps() {
        let machine = HostedMachine::new(2, 1024);
        let image = machine.program_image();
        let config = TaskConfig::default().with_cpu_count(2);
        let manager = TaskManager::new(machine, config, image).unwrap();
        manager.init_cpu(0).unwrap();
        let mut frame = manager.init_cpu(1).unwrap();
        let idle = manager.idle_task(1).unwrap();

        let outcome = manager.sleep(1, 50, &mut frame);
        assert_eq!(outcome, SwitchOutcome::Continued(idle));
        assert_eq!(manager.task_state(idle), Some(TaskState::Running));
    }

    #[test]
    fn test_boot_task_sleeps_and_wakes() {
        let (manager, mut frame) = booted();
        let boot_task = TaskId::new(0);
        let child = manager.fork(0, &mut frame).unwrap();

        assert_eq!(
            manager.sleep(0, 5, &mut frame),
            SwitchOutcome::Switched {
                from: Some(boot_task),
                to: child
            }
        );
        assert_eq!(manager.task_state(boot_task), Some(TaskState::Sleeping));

        for _ in 0..4 {
            manager.timer_tick(0, &mut frame);
            manager.yield_to_next(0, &mut frame);
            assert_eq!(manager.current_task(0), Some(child));
        }
        manager.timer_tick(0, &mut frame);
        assert_eq!(manager.task_state(boot_task), Some(TaskState::Runnable));
        manager.yield_to_next(0, &mut frame);
        assert_eq!(manager.current_task(0), Some(boot_task));
    }

    #[test]
    fn test_zero_ticks_is_a_yield() {
        let (manager, mut frame) = booted();
        let child = manager.fork(0, &mut frame).unwrap();
        manager.yield_to_next(0, &mut frame);

        let outcome = manager.sleep(0, 0, &mut frame);
        assert_eq!(
            outcome,
            SwitchOutcome::Switched {
                from: Some(child),
                to: TaskId::new(0)
            }
        );
        assert_eq!(manager.task_state(child), Some(TaskState::Runnable));
    }

    #[test]
    fn test_sleeping_task_is_skipped_until_woken() {
        let (manager, mut frame) = booted();
        let child = manager.fork(0, &mut frame).unwrap();
        manager.yield_to_next(0, &mut frame);

        manager.sleep(0, 3, &mut frame);
        assert_eq!(manager.task_state(child), Some(TaskState::Sleeping));
        assert_eq!(manager.remaining_quantum_of(child), Some(3));

        for _ in 0..2 {
            manager.timer_tick(0, &mut frame);
            assert_eq!(
                manager.yield_to_next(0, &mut frame),
                SwitchOutcome::Continued(TaskId::new(0))
            );
        }
        manager.timer_tick(0, &mut frame);
        assert_eq!(
            manager.yield_to_next(0, &mut frame),
            SwitchOutcome::Switched {
                from: Some(TaskId::new(0)),
                to: child
            }
        );
    }
}
