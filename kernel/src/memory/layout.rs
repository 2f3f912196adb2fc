//! User address space layout
//!
//! Every task sees the same user program image: four linker sections
//! (text, data, bss, rodata) backed by fixed physical frames, mapped fresh
//! into each address space. Only the user stack is private per task.

use x86_64::structures::paging::{Page, PageTableFlags, PhysFrame};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::PAGE_SIZE;

/// Permissions of user stack pages.
pub const USER_STACK_FLAGS: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

/// Permissions of program section pages.
pub const USER_SECTION_FLAGS: PageTableFlags = USER_STACK_FLAGS;

/// Which linker section a [`ProgramSection`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
    Bss,
    Rodata,
}

/// One section of the user program: a virtual range and the physical frames
/// already holding its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSection {
    pub kind: SectionKind,
    pub start: VirtAddr,
    pub size: u64,
    pub phys_start: PhysAddr,
}

impl ProgramSection {
    pub fn new(kind: SectionKind, start: VirtAddr, size: u64, phys_start: PhysAddr) -> Self {
        Self {
            kind,
            start,
            size,
            phys_start,
        }
    }

    /// Pages covering the section together with the frames backing them.
    pub fn pages(&self) -> impl Iterator<Item = (Page, PhysFrame)> + '_ {
        let first = self.start.align_down(PAGE_SIZE);
        let end = self.start + self.size;
        let phys_first = self.phys_start.align_down(PAGE_SIZE);
        (first.as_u64()..end.as_u64())
            .step_by(PAGE_SIZE as usize)
            .map(move |va| {
                let offset = va - first.as_u64();
                (
                    Page::containing_address(VirtAddr::new(va)),
                    PhysFrame::containing_address(phys_first + offset),
                )
            })
    }
}

/// The user program linked into the kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage {
    pub sections: [ProgramSection; 4],
    /// Entry point of the first task on the boot core.
    pub user_entry: VirtAddr,
    /// Entry point of every other core's idle task.
    pub idle_entry: VirtAddr,
}

/// Pages of a user stack of `size` bytes ending at `top`, lowest first.
pub fn user_stack_pages(top: VirtAddr, size: u64) -> impl Iterator<Item = Page> {
    let bottom = top - size;
    (bottom.as_u64()..top.as_u64())
        .step_by(PAGE_SIZE as usize)
        .map(|va| Page::containing_address(VirtAddr::new(va)))
}
