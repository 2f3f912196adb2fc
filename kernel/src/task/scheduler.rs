//! Round-robin scheduler
//!
//! Each core schedules only the tasks in its own run queue. Switching is
//! done on the trap frame the core entered the kernel with: the outgoing
//! task's registers are saved from it and the incoming task's saved
//! registers are written over it, so returning from the trap resumes the
//! picked task.
//!
//! Sequence on a switch: pick from the run queue, save the outgoing frame,
//! update states, load the incoming root, restore the incoming frame. The
//! global task lock is never held here.

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{CpuOps, Machine, PageTableOps};
use crate::process::TaskManager;
use crate::task::{CpuId, TaskId, TaskState};

/// What [`TaskManager::yield_to_next`] did to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The current task was picked again; nothing was switched.
    Continued(TaskId),
    /// The frame now holds `to`'s registers and its root is loaded.
    Switched { from: Option<TaskId>, to: TaskId },
    /// Nothing in the run queue is eligible. The frame is untouched and the
    /// core waits for a timer tick to make something eligible.
    Halted,
}

impl<M: Machine> TaskManager<M> {
    /// Pick the next task on `cpu` and switch `frame` to it.
    pub fn yield_to_next(&self, cpu: CpuId, frame: &mut TrapFrame) -> SwitchOutcome {
        debug_assert!(
            !self.shape.is_held_by(cpu),
            "cpu {} entered the scheduler holding the task lock",
            cpu
        );
        let Some(per_cpu) = self.cpus.get(cpu) else {
            log::error!("yield on unknown cpu {}", cpu);
            return SwitchOutcome::Halted;
        };

        let current = per_cpu.current();
        let picked = per_cpu.run_queue().advance_and_pick(|id| {
            self.table
                .get(id)
                .is_some_and(|tcb| tcb.state().is_eligible())
        });

        let Some(next) = picked else {
            log::trace!("cpu {}: nothing eligible, halting", cpu);
            return SwitchOutcome::Halted;
        };
        let Some(next_tcb) = self.table.get(next) else {
            return SwitchOutcome::Halted;
        };

        if current == Some(next) {
            // A halted core resumes its woken sleeper in place
            next_tcb.set_state(TaskState::Running);
            next_tcb.set_remaining_quantum(self.config.time_quantum);
            log::trace!("cpu {}: task {} continues", cpu, next);
            return SwitchOutcome::Continued(next);
        }

        if let Some(prev) = current.and_then(|id| self.table.get(id)) {
            prev.context().trap_frame = frame.clone();
            if prev.state() == TaskState::Running {
                prev.set_state(TaskState::Runnable);
                prev.set_remaining_quantum(self.config.time_quantum);
            }
        }

        next_tcb.set_state(TaskState::Running);
        next_tcb.set_remaining_quantum(self.config.time_quantum);
        per_cpu.set_current(Some(next));

        let context = next_tcb.context();
        match context.address_space.as_ref() {
            Some(space) => self.machine.load_root(cpu, space.root()),
            None => {
                log::error!("cpu {}: task {} has no address space", cpu, next);
                self.machine.load_root(cpu, self.machine.kernel_root());
            }
        }
        *frame = context.trap_frame.clone();

        log::trace!("cpu {}: switch {:?} -> {}", cpu, current, next);
        SwitchOutcome::Switched { from: current, to: next }
    }

    /// Periodic timer interrupt on `cpu`.
    ///
    /// Counts down sleeping tasks in this core's queue, waking those that
    /// reach zero, then charges the tick to the running task. Returns the
    /// scheduler's outcome when the running task's quantum ran out, or when
    /// a halted core found something to dispatch.
    pub fn timer_tick(&self, cpu: CpuId, frame: &mut TrapFrame) -> Option<SwitchOutcome> {
        let per_cpu = self.cpus.get(cpu)?;
        if cpu == 0 {
            self.ticks.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        }
        per_cpu.tick();

        for id in per_cpu.run_queue().iter() {
            let Some(tcb) = self.table.get(id) else {
                continue;
            };
            if tcb.state() == TaskState::Sleeping && tcb.consume_tick() == 0 {
                tcb.set_state(TaskState::Runnable);
                log::trace!("cpu {}: task {} woke", cpu, id);
            }
        }

        let running = per_cpu
            .current()
            .and_then(|id| self.table.get(id))
            .filter(|tcb| tcb.state() == TaskState::Running);

        match running {
            Some(current) if current.consume_tick() == 0 => Some(self.yield_to_next(cpu, frame)),
            Some(_) => None,
            // Halted: the current task sleeps or was killed
            None => match self.yield_to_next(cpu, frame) {
                SwitchOutcome::Halted => None,
                outcome => Some(outcome),
            },
        }
    }
}
