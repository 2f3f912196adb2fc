//! Hosted machine.
//!
//! Simulates everything the task layer consumes from the hardware: a pool of
//! physical frames with real byte contents, per-root page tables with
//! last-level table pages accounted as frames, a kernel mapping shared by
//! every root, and one page-table root register per core.
//!
//! Fault injection hooks let tests run the allocator dry at a chosen point
//! or punch holes into a page table.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use x86_64::structures::paging::{Page, PageTableFlags, PhysFrame};
use x86_64::{PhysAddr, VirtAddr};

use super::traits::{CpuOps, FrameAllocator, PageTableEntry, PageTableOps, PageTableRoot};
use super::x86_64::constants::{KERNEL_HIGHER_HALF_BASE, PAGE_TABLE_SPAN, USERSPACE_BASE};
use crate::config::PAGE_SIZE;
use crate::error::MemoryError;
use crate::memory::layout::{ProgramImage, ProgramSection, SectionKind};
use crate::task::CpuId;

/// First frame handed out by the allocator (1 MiB).
const FRAME_POOL_BASE: u64 = 0x10_0000;

/// The kernel's own root table. Not part of the allocator pool.
const KERNEL_ROOT_FRAME: u64 = 0x1000;

/// Frame backing the shared kernel mapping.
const KERNEL_IMAGE_FRAME: u64 = 0x2000;

/// Physical home of the user program image.
const PROGRAM_IMAGE_BASE: u64 = 0x8_0000;

/// Fill byte of frames that were never zeroed.
const UNINITIALIZED_BYTE: u8 = 0xA5;

struct PhysicalMemory {
    capacity: usize,
    free: Vec<PhysFrame>,
    allocated: BTreeSet<u64>,
    contents: BTreeMap<u64, Box<[u8]>>,
    /// Remaining successful allocations before injected failure.
    allocations_left: Option<usize>,
}

impl PhysicalMemory {
    fn new(frame_count: usize) -> Self {
        let free = (0..frame_count as u64)
            .rev()
            .map(|i| PhysFrame::containing_address(PhysAddr::new(FRAME_POOL_BASE + i * PAGE_SIZE)))
            .collect();
        Self {
            capacity: frame_count,
            free,
            allocated: BTreeSet::new(),
            contents: BTreeMap::new(),
            allocations_left: None,
        }
    }

    fn allocate(&mut self, zero: bool) -> Result<PhysFrame, MemoryError> {
        match self.allocations_left {
            Some(0) => return Err(MemoryError::OutOfMemory),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        let frame = self.free.pop().ok_or(MemoryError::OutOfMemory)?;
        self.allocated.insert(frame.start_address().as_u64());
        if zero {
            self.page_mut(frame).fill(0);
        }
        Ok(frame)
    }

    fn free(&mut self, frame: PhysFrame) {
        let addr = frame.start_address().as_u64();
        if !self.allocated.remove(&addr) {
            log::error!("hosted: free of unallocated frame {:#x}", addr);
            return;
        }
        self.free.push(frame);
    }

    fn page_mut(&mut self, frame: PhysFrame) -> &mut [u8] {
        self.contents
            .entry(frame.start_address().as_u64())
            .or_insert_with(|| alloc::vec![UNINITIALIZED_BYTE; PAGE_SIZE as usize].into_boxed_slice())
    }
}

#[derive(Default)]
struct HostedSpace {
    /// Last-level table pages, keyed by the 2 MiB region they cover.
    tables: BTreeMap<u64, PhysFrame>,
    entries: BTreeMap<u64, PageTableEntry>,
}

/// A simulated machine implementing every collaborator trait.
pub struct HostedMachine {
    memory: Mutex<PhysicalMemory>,
    spaces: Mutex<BTreeMap<u64, HostedSpace>>,
    kernel_root: PageTableRoot,
    kernel_entries: BTreeMap<u64, PageTableEntry>,
    image: ProgramImage,
    active_roots: Vec<AtomicU64>,
    root_loads: Vec<AtomicU64>,
}

impl HostedMachine {
    /// A machine with `cpu_count` cores and `frame_count` allocatable frames.
    pub fn new(cpu_count: usize, frame_count: usize) -> Self {
        let kernel_root = PageTableRoot::from_frame(frame_at(KERNEL_ROOT_FRAME));

        let mut kernel_entries = BTreeMap::new();
        kernel_entries.insert(
            KERNEL_HIGHER_HALF_BASE,
            PageTableEntry::new(
                frame_at(KERNEL_IMAGE_FRAME),
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::GLOBAL,
            ),
        );

        let mut spaces = BTreeMap::new();
        spaces.insert(KERNEL_ROOT_FRAME, HostedSpace::default());

        Self {
            memory: Mutex::new(PhysicalMemory::new(frame_count)),
            spaces: Mutex::new(spaces),
            kernel_root,
            kernel_entries,
            image: default_program_image(),
            active_roots: (0..cpu_count).map(|_| AtomicU64::new(0)).collect(),
            root_loads: (0..cpu_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// The user program this machine's image frames hold.
    pub fn program_image(&self) -> ProgramImage {
        self.image
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Let the next `n` allocations succeed and every later one fail.
    pub fn fail_allocations_after(&self, n: usize) {
        self.memory.lock().allocations_left = Some(n);
    }

    pub fn clear_allocation_fault(&self) {
        self.memory.lock().allocations_left = None;
    }

    /// Remove the mapping of `addr` without freeing its frame.
    pub fn drop_mapping(&self, root: PageTableRoot, addr: VirtAddr) -> Option<PhysFrame> {
        let mut spaces = self.spaces.lock();
        let space = spaces.get_mut(&root_key(root))?;
        space
            .entries
            .remove(&addr.align_down(PAGE_SIZE).as_u64())
            .map(|entry| entry.frame())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn read_bytes(&self, frame: PhysFrame, offset: usize, len: usize) -> Vec<u8> {
        let mut memory = self.memory.lock();
        memory.page_mut(frame)[offset..offset + len].to_vec()
    }

    pub fn write_bytes(&self, frame: PhysFrame, offset: usize, bytes: &[u8]) {
        let mut memory = self.memory.lock();
        memory.page_mut(frame)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// How many times `cpu` had a root loaded.
    pub fn root_loads(&self, cpu: CpuId) -> u64 {
        self.root_loads[cpu].load(Ordering::Acquire)
    }

    /// Task address spaces that have not been freed.
    pub fn live_space_count(&self) -> usize {
        self.spaces.lock().len() - 1
    }

    /// Leaf mappings present in `root`, excluding the kernel mapping.
    pub fn mapping_count(&self, root: PageTableRoot) -> usize {
        self.spaces
            .lock()
            .get(&root_key(root))
            .map_or(0, |space| space.entries.len())
    }

    pub fn has_kernel_mapping(&self, root: PageTableRoot) -> bool {
        self.walk(root, VirtAddr::new(KERNEL_HIGHER_HALF_BASE)).is_some()
    }
}

impl FrameAllocator for HostedMachine {
    fn allocate_page(&self, zero: bool) -> Result<PhysFrame, MemoryError> {
        self.memory.lock().allocate(zero)
    }

    fn free_page(&self, frame: PhysFrame) {
        self.memory.lock().free(frame);
    }

    fn copy_page(&self, dst: PhysFrame, src: PhysFrame) {
        let mut memory = self.memory.lock();
        let bytes = memory.page_mut(src).to_vec();
        memory.page_mut(dst).copy_from_slice(&bytes);
    }

    fn free_page_count(&self) -> usize {
        self.memory.lock().free.len()
    }

    fn used_page_count(&self) -> usize {
        let memory = self.memory.lock();
        memory.capacity - memory.free.len()
    }
}

impl PageTableOps for HostedMachine {
    fn new_kernel_root(&self) -> Result<PageTableRoot, MemoryError> {
        let frame = self.allocate_page(true)?;
        self.spaces
            .lock()
            .insert(frame.start_address().as_u64(), HostedSpace::default());
        Ok(PageTableRoot::from_frame(frame))
    }

    fn kernel_root(&self) -> PageTableRoot {
        self.kernel_root
    }

    fn map(
        &self,
        root: PageTableRoot,
        page: Page,
        frame: PhysFrame,
        flags: PageTableFlags,
    ) -> Result<(), MemoryError> {
        let mut spaces = self.spaces.lock();
        let Some(space) = spaces.get_mut(&root_key(root)) else {
            log::error!("hosted: map into unknown root {:#x}", root_key(root));
            return Err(MemoryError::OutOfMemory);
        };

        let va = page.start_address().as_u64();
        let region = va / PAGE_TABLE_SPAN;
        if !space.tables.contains_key(&region) {
            let table = self.memory.lock().allocate(true)?;
            space.tables.insert(region, table);
        }
        space.entries.insert(va, PageTableEntry::new(frame, flags));
        Ok(())
    }

    fn unmap(&self, root: PageTableRoot, page: Page) -> Option<PhysFrame> {
        let mut spaces = self.spaces.lock();
        spaces
            .get_mut(&root_key(root))?
            .entries
            .remove(&page.start_address().as_u64())
            .map(|entry| entry.frame())
    }

    fn walk(&self, root: PageTableRoot, addr: VirtAddr) -> Option<PageTableEntry> {
        let page = addr.align_down(PAGE_SIZE).as_u64();
        if page >= KERNEL_HIGHER_HALF_BASE {
            return self.kernel_entries.get(&page).copied();
        }
        let spaces = self.spaces.lock();
        spaces.get(&root_key(root))?.entries.get(&page).copied()
    }

    fn free_page_tables(&self, root: PageTableRoot) {
        let mut spaces = self.spaces.lock();
        let Some(space) = spaces.get_mut(&root_key(root)) else {
            return;
        };
        let tables = core::mem::take(&mut space.tables);
        space.entries.clear();
        let mut memory = self.memory.lock();
        for table in tables.into_values() {
            memory.free(table);
        }
    }

    fn free_root(&self, root: PageTableRoot) {
        if root == self.kernel_root {
            log::error!("hosted: refusing to free the kernel root");
            return;
        }
        if self.spaces.lock().remove(&root_key(root)).is_some() {
            self.memory.lock().free(root.frame());
        }
    }
}

impl CpuOps for HostedMachine {
    fn load_root(&self, cpu: CpuId, root: PageTableRoot) {
        self.active_roots[cpu].store(root_key(root), Ordering::Release);
        self.root_loads[cpu].fetch_add(1, Ordering::AcqRel);
    }

    fn active_root(&self, cpu: CpuId) -> Option<PageTableRoot> {
        match self.active_roots[cpu].load(Ordering::Acquire) {
            0 => None,
            addr => Some(PageTableRoot::from_frame(frame_at(addr))),
        }
    }
}

fn frame_at(addr: u64) -> PhysFrame {
    PhysFrame::containing_address(PhysAddr::new(addr))
}

fn root_key(root: PageTableRoot) -> u64 {
    root.frame().start_address().as_u64()
}

fn default_program_image() -> ProgramImage {
    let section = |kind, page: u64, pages: u64| {
        ProgramSection::new(
            kind,
            VirtAddr::new(USERSPACE_BASE + page * PAGE_SIZE),
            pages * PAGE_SIZE,
            PhysAddr::new(PROGRAM_IMAGE_BASE + page * PAGE_SIZE),
        )
    };
    ProgramImage {
        sections: [
            section(SectionKind::Text, 0, 2),
            section(SectionKind::Data, 2, 1),
            section(SectionKind::Bss, 3, 1),
            section(SectionKind::Rodata, 4, 1),
        ],
        user_entry: VirtAddr::new(USERSPACE_BASE),
        idle_entry: VirtAddr::new(USERSPACE_BASE + PAGE_SIZE),
    }
}
