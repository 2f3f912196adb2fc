//! Shared setup for the task-layer integration tests
//!
//! Boots a `TaskManager` over the hosted machine with every core online and
//! hands back one live trap frame per core.

#![allow(dead_code)]

use tasklab::arch_impl::current::TrapFrame;
use tasklab::arch_impl::hosted::HostedMachine;
use tasklab::{logger, TaskConfig, TaskId, TaskManager};

pub const FRAMES: usize = 2048;

pub struct Booted {
    pub manager: TaskManager<HostedMachine>,
    /// Live registers of whatever task each core is running.
    pub frames: Vec<TrapFrame>,
}

impl Booted {
    /// Live tasks equal run-queue entries, and every queued task is live
    /// and owned by the core whose queue lists it.
    pub fn assert_consistent(&self) {
        let manager = &self.manager;
        assert_eq!(manager.live_task_count(), manager.queued_task_count());
        for cpu in 0..manager.config().cpu_count {
            for id in manager.run_queue_snapshot(cpu) {
                assert_eq!(manager.owning_cpu_of(id), Some(cpu), "task {} on cpu {}", id, cpu);
            }
        }
    }
}

pub fn boot(config: TaskConfig) -> Booted {
    logger::init(log::LevelFilter::Debug);

    let machine = HostedMachine::new(config.cpu_count, FRAMES);
    let image = machine.program_image();
    let manager = TaskManager::new(machine, config, image).expect("valid config");
    let frames = (0..config.cpu_count)
        .map(|cpu| manager.init_cpu(cpu).expect("cpu boots"))
        .collect();
    Booted { manager, frames }
}

pub fn boot_cpus(cpus: usize) -> Booted {
    boot(TaskConfig::default().with_cpu_count(cpus))
}

/// Fork from `cpu` until a child lands on `target`.
pub fn fork_onto(booted: &mut Booted, cpu: usize, target: usize) -> TaskId {
    loop {
        let child = booted
            .manager
            .fork(cpu, &mut booted.frames[cpu])
            .expect("fork succeeds");
        if booted.manager.owning_cpu_of(child) == Some(target) {
            return child;
        }
    }
}
