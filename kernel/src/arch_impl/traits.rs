//! Collaborator contracts consumed by the task layer.
//!
//! The task layer never touches physical memory, page tables or the
//! page-table root register directly. Everything it needs from the machine
//! goes through these traits, so the same scheduling and lifecycle code runs
//! on real hardware and on the hosted simulation used by the tests.

use x86_64::structures::paging::{Page, PageTableFlags, PhysFrame};
use x86_64::VirtAddr;

use crate::error::MemoryError;
use crate::task::CpuId;

/// Opaque handle to the root of a page-table hierarchy (CR3 value on x86_64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageTableRoot(PhysFrame);

impl PageTableRoot {
    pub const fn from_frame(frame: PhysFrame) -> Self {
        Self(frame)
    }

    pub fn frame(self) -> PhysFrame {
        self.0
    }
}

/// A present leaf mapping found by a page-table walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    frame: PhysFrame,
    flags: PageTableFlags,
}

impl PageTableEntry {
    pub fn new(frame: PhysFrame, flags: PageTableFlags) -> Self {
        Self { frame, flags }
    }

    pub fn frame(&self) -> PhysFrame {
        self.frame
    }

    pub fn flags(&self) -> PageTableFlags {
        self.flags
    }
}

/// Physical page allocator.
///
/// Must be safe to call from any core concurrently.
pub trait FrameAllocator: Sync {
    /// Allocate one 4 KiB frame, zero-filled when `zero` is set.
    fn allocate_page(&self, zero: bool) -> Result<PhysFrame, MemoryError>;

    /// Return a frame to the allocator.
    fn free_page(&self, frame: PhysFrame);

    /// Copy the full contents of `src` into `dst`.
    fn copy_page(&self, dst: PhysFrame, src: PhysFrame);

    /// Number of frames currently available.
    fn free_page_count(&self) -> usize;

    /// Number of frames currently handed out.
    fn used_page_count(&self) -> usize;
}

/// Page-table primitives.
pub trait PageTableOps: Sync {
    /// Build a fresh root that already contains the shared kernel mapping.
    fn new_kernel_root(&self) -> Result<PageTableRoot, MemoryError>;

    /// The kernel's own root, active whenever no task address space is.
    fn kernel_root(&self) -> PageTableRoot;

    /// Map `page` to `frame`, allocating intermediate tables as needed.
    fn map(
        &self,
        root: PageTableRoot,
        page: Page,
        frame: PhysFrame,
        flags: PageTableFlags,
    ) -> Result<(), MemoryError>;

    /// Remove the mapping of `page`, handing back the frame it pointed at.
    fn unmap(&self, root: PageTableRoot, page: Page) -> Option<PhysFrame>;

    /// Look up the present leaf entry translating `addr`.
    fn walk(&self, root: PageTableRoot, addr: VirtAddr) -> Option<PageTableEntry>;

    /// Free every intermediate table page below `root`. Leaf frames still
    /// mapped are not freed.
    fn free_page_tables(&self, root: PageTableRoot);

    /// Free the root table itself.
    fn free_root(&self, root: PageTableRoot);
}

/// Per-core register operations.
pub trait CpuOps: Sync {
    /// Make `root` the active address space on `cpu`.
    fn load_root(&self, cpu: CpuId, root: PageTableRoot);

    /// The address space currently active on `cpu`, if any was loaded.
    fn active_root(&self, cpu: CpuId) -> Option<PageTableRoot>;
}

/// Everything the task layer needs from the machine.
pub trait Machine: FrameAllocator + PageTableOps + CpuOps {}

impl<T: FrameAllocator + PageTableOps + CpuOps> Machine for T {}

/// Syscall frame abstraction.
///
/// x86_64: RAX=number, RDI/RSI/RDX=args, RAX=return value.
pub trait SyscallFrame {
    /// Get the syscall number.
    fn syscall_number(&self) -> u64;

    /// Get syscall argument 1.
    fn arg1(&self) -> u64;

    /// Get syscall argument 2.
    fn arg2(&self) -> u64;

    /// Get syscall argument 3.
    fn arg3(&self) -> u64;

    /// Set the return value for the syscall.
    fn set_return_value(&mut self, value: u64);

    /// Get the return value (for inspection).
    fn return_value(&self) -> u64;
}
