//! fork()
//!
//! The child is a copy of the calling task: same registers, a private copy
//! of the user stack, and its own mapping of the program image. Both tasks
//! resume from the same trap frame; only the return register differs (0 in
//! the child, the child's id in the parent).
//!
//! Children are spread over cores by a round-robin counter kept under the
//! global task lock. Once placed, a task never migrates.

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{Machine, SyscallFrame};
use crate::error::TaskError;
use crate::memory::address_space;
use crate::process::TaskManager;
use crate::task::{CpuId, TaskId};

impl<M: Machine> TaskManager<M> {
    /// Fork the task running on `cpu`, whose live registers are `frame`.
    ///
    /// On success `frame`'s return register holds the child's id and the
    /// child has been admitted to some core's run queue. On failure no
    /// slot, frame or run-queue entry is left behind.
    pub fn fork(&self, cpu: CpuId, frame: &mut TrapFrame) -> Result<TaskId, TaskError> {
        let per_cpu = self.per_cpu(cpu)?;
        let Some(parent) = per_cpu.current() else {
            log::warn!("fork on cpu {} with no current task", cpu);
            return Err(TaskError::InvalidCpu(cpu));
        };

        let child = match self.create_task(cpu, Some(parent)) {
            Ok(child) => child,
            Err(e) => {
                log::warn!("fork from task {} failed: {}", parent, e);
                return Err(e);
            }
        };

        if let Err(e) = self.clone_task(child, parent, frame) {
            match e {
                TaskError::AddressSpaceCorrupt { .. } => log::error!("fork from task {}: {}", parent, e),
                _ => log::warn!("fork from task {} failed: {}", parent, e),
            }
            self.abandon_task(cpu, child);
            return Err(e);
        }

        let target = {
            let mut shape = self.shape.lock(cpu);
            shape.next_cpu = (shape.next_cpu + 1) % self.config.cpu_count;
            let target = shape.next_cpu;
            if let Some(tcb) = self.table.get(child) {
                tcb.set_owning_cpu(target);
            }
            self.cpus[target].run_queue().admit(child);
            target
        };

        frame.set_return_value(child.as_usize() as u64);
        log::debug!("fork: task {} -> child {} on cpu {}", parent, child, target);
        Ok(child)
    }

    /// Copy the parent's registers, stack and program mappings into `child`.
    fn clone_task(&self, child: TaskId, parent: TaskId, frame: &TrapFrame) -> Result<(), TaskError> {
        let (Some(child_tcb), Some(parent_tcb)) = (self.table.get(child), self.table.get(parent)) else {
            return Err(TaskError::InvalidTarget(child));
        };

        let parent_context = parent_tcb.context();
        let mut child_context = child_tcb.context();
        let child_context = &mut *child_context;
        let (Some(parent_space), Some(child_space)) = (
            parent_context.address_space.as_ref(),
            child_context.address_space.as_ref(),
        ) else {
            return Err(TaskError::InvalidTarget(child));
        };

        address_space::clone_into(
            &self.machine,
            child,
            &mut child_context.trap_frame,
            child_space,
            frame,
            parent_space,
            &self.config,
            &self.image,
        )?;
        child_context.trap_frame.set_return_value(0);
        Ok(())
    }
}
