//! Task creation and per-CPU boot
//!
//! A task is born in two steps: a slot is claimed under the global task
//! lock, then its address space is built without the lock held. If the
//! second step fails the slot goes straight back to Free, so no half-built
//! task is ever visible to a scheduler.

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{CpuOps, Machine};
use crate::error::{MemoryError, TaskError};
use crate::memory::address_space;
use crate::process::TaskManager;
use crate::task::{CpuId, TaskId, TaskState};

impl<M: Machine> TaskManager<M> {
    /// Claim a slot and give it a fresh address space with a zeroed user
    /// stack. The task is Runnable but not admitted to any run queue.
    pub(crate) fn create_task(&self, cpu: CpuId, parent: Option<TaskId>) -> Result<TaskId, TaskError> {
        let id = {
            let mut shape = self.shape.lock(cpu);
            self.table
                .allocate(&mut shape, parent, self.config.time_quantum)?
        };

        match address_space::create_for(&self.machine, id, &self.config) {
            Ok(space) => {
                if let Some(tcb) = self.table.get(id) {
                    tcb.context().address_space = Some(space);
                }
                Ok(id)
            }
            Err(e) => {
                self.table.release(&mut self.shape.lock(cpu), id);
                Err(e.into())
            }
        }
    }

    /// Tear down a task that never reached a run queue.
    pub(crate) fn abandon_task(&self, cpu: CpuId, id: TaskId) {
        let Some(tcb) = self.table.get(id) else {
            return;
        };
        let space = tcb.context().address_space.take();
        if let Some(space) = space {
            address_space::destroy(&self.machine, space, cpu, &self.config);
        }
        self.table.release(&mut self.shape.lock(cpu), id);
    }

    /// Bring `cpu` online.
    ///
    /// Creates the core's first task with the program image mapped in. The
    /// first core to boot starts it at the program's user entry, every
    /// other core at the idle entry and records it as the core's idle task.
    /// The task becomes the core's current task and the front of its run
    /// queue, ahead of any children forked onto the core before it booted,
    /// and its root is loaded.
    ///
    /// Returns the trap frame the core should return to user mode with.
    pub fn init_cpu(&self, cpu: CpuId) -> Result<TrapFrame, TaskError> {
        let per_cpu = self.per_cpu(cpu)?;
        if per_cpu.is_online() {
            log::warn!("cpu {} booted twice", cpu);
            return Err(TaskError::InvalidCpu(cpu));
        }

        let id = self.create_task(cpu, None)?;
        let Some(tcb) = self.table.get(id) else {
            return Err(TaskError::InvalidTarget(id));
        };

        let mapped = {
            let context = tcb.context();
            match context.address_space.as_ref() {
                Some(space) => address_space::map_program(&self.machine, space, &self.image)
                    .map(|()| space.root()),
                None => Err(MemoryError::OutOfMemory),
            }
        };
        let root = match mapped {
            Ok(root) => root,
            Err(e) => {
                log::warn!("cpu {}: mapping program for task {} failed: {}", cpu, id, e);
                self.abandon_task(cpu, id);
                return Err(e.into());
            }
        };

        let (entry, is_idle) = {
            let mut shape = self.shape.lock(cpu);
            if shape.user_entry_taken {
                (self.image.idle_entry, true)
            } else {
                shape.user_entry_taken = true;
                (self.image.user_entry, false)
            }
        };
        let frame = TrapFrame::new_user(entry, self.config.user_stack_top);
        tcb.context().trap_frame = frame.clone();

        tcb.set_owning_cpu(cpu);
        tcb.set_state(TaskState::Running);
        per_cpu.run_queue().install_first(id);
        if is_idle {
            per_cpu.set_idle_task(id);
        }
        per_cpu.set_current(Some(id));
        per_cpu.set_online();
        self.machine.load_root(cpu, root);

        log::info!(
            "cpu {} online: task {} at {:#x}",
            cpu,
            id,
            entry.as_u64()
        );
        Ok(frame)
    }
}
