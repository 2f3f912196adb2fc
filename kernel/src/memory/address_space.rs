//! Per-task address spaces
//!
//! An [`AddressSpace`] is exclusively owned by one task. It starts as a
//! fresh root holding the shared kernel mapping, gains a private user stack,
//! and has the program sections mapped in. Teardown must happen with the
//! kernel's own root active on the executing core.

use x86_64::VirtAddr;

use crate::arch_impl::current::TrapFrame;
use crate::arch_impl::{Machine, PageTableEntry, PageTableOps, PageTableRoot};
use crate::config::TaskConfig;
use crate::error::{CopySide, MemoryError, TaskError};
use crate::memory::layout::{user_stack_pages, ProgramImage, USER_SECTION_FLAGS, USER_STACK_FLAGS};
use crate::task::{CpuId, TaskId};

/// Handle to a task's page-table root.
///
/// Not `Clone`: exactly one owner may hand it to [`destroy`].
#[derive(Debug, PartialEq, Eq)]
pub struct AddressSpace {
    root: PageTableRoot,
}

impl AddressSpace {
    pub fn root(&self) -> PageTableRoot {
        self.root
    }

    /// Translate `addr` through this address space.
    pub fn walk<M: PageTableOps + ?Sized>(&self, machine: &M, addr: VirtAddr) -> Option<PageTableEntry> {
        machine.walk(self.root, addr)
    }
}

/// Build the address space of a new task: kernel mapping plus a zeroed,
/// user-writable stack below `config.user_stack_top`.
///
/// On allocation failure everything built so far is released again.
pub fn create_for<M: Machine + ?Sized>(
    machine: &M,
    task: TaskId,
    config: &TaskConfig,
) -> Result<AddressSpace, MemoryError> {
    let space = AddressSpace {
        root: machine.new_kernel_root()?,
    };

    for page in user_stack_pages(config.user_stack_top, config.user_stack_size) {
        let frame = match machine.allocate_page(true) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("task {}: user stack allocation failed: {}", task, e);
                release(machine, space, config);
                return Err(e);
            }
        };
        if let Err(e) = machine.map(space.root, page, frame, USER_STACK_FLAGS) {
            log::warn!(
                "task {}: mapping user stack page {:#x} failed: {}",
                task,
                page.start_address().as_u64(),
                e
            );
            machine.free_page(frame);
            release(machine, space, config);
            return Err(e);
        }
    }

    log::trace!("task {}: address space root {:#x}", task, space.root.frame().start_address().as_u64());
    Ok(space)
}

/// Map the four program sections into `space`.
pub fn map_program<M: Machine + ?Sized>(
    machine: &M,
    space: &AddressSpace,
    image: &ProgramImage,
) -> Result<(), MemoryError> {
    for section in image.sections.iter() {
        for (page, frame) in section.pages() {
            machine.map(space.root, page, frame, USER_SECTION_FLAGS)?;
        }
    }
    Ok(())
}

/// Make `child` a copy of the parent: trap frame, user stack contents and
/// program mappings.
///
/// Stack pages are located in both address spaces by page-table walk and
/// copied frame to frame. A stack page missing on either side fails the
/// clone with [`TaskError::AddressSpaceCorrupt`]; the caller owns the
/// cleanup of the half-built child.
pub fn clone_into<M: Machine + ?Sized>(
    machine: &M,
    child: TaskId,
    child_frame: &mut TrapFrame,
    child_space: &AddressSpace,
    parent_frame: &TrapFrame,
    parent_space: &AddressSpace,
    config: &TaskConfig,
    image: &ProgramImage,
) -> Result<(), TaskError> {
    *child_frame = parent_frame.clone();

    for page in user_stack_pages(config.user_stack_top, config.user_stack_size) {
        let addr = page.start_address();
        let src = parent_space.walk(machine, addr).ok_or(TaskError::AddressSpaceCorrupt {
            task: child,
            addr,
            side: CopySide::Parent,
        })?;
        let dst = child_space.walk(machine, addr).ok_or(TaskError::AddressSpaceCorrupt {
            task: child,
            addr,
            side: CopySide::Child,
        })?;
        machine.copy_page(dst.frame(), src.frame());
    }

    map_program(machine, child_space, image)?;
    Ok(())
}

/// Tear down `space`: stack pages, then page-table pages, then the root.
///
/// `cpu` must not have `space` loaded; switch to the kernel root first.
pub fn destroy<M: Machine + ?Sized>(machine: &M, space: AddressSpace, cpu: CpuId, config: &TaskConfig) {
    debug_assert_ne!(
        machine.active_root(cpu),
        Some(space.root),
        "destroying the address space active on cpu {}",
        cpu
    );
    release(machine, space, config);
}

fn release<M: Machine + ?Sized>(machine: &M, space: AddressSpace, config: &TaskConfig) {
    for page in user_stack_pages(config.user_stack_top, config.user_stack_size) {
        if let Some(frame) = machine.unmap(space.root, page) {
            machine.free_page(frame);
        }
    }
    machine.free_page_tables(space.root);
    machine.free_root(space.root);
}
