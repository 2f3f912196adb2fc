//! x86_64 architecture constants.

// ============================================================================
// Memory Layout Constants
// ============================================================================

/// Base address for the higher-half kernel mapping shared by every
/// address space.
pub const KERNEL_HIGHER_HALF_BASE: u64 = 0xFFFF_8000_0000_0000;

/// User program sections are linked starting here.
pub const USERSPACE_BASE: u64 = 0x4000_0000;

/// Bytes covered by one last-level page table (512 entries of 4 KiB).
pub const PAGE_TABLE_SPAN: u64 = 2 * 1024 * 1024;

// ============================================================================
// Segment Selectors
// ============================================================================

/// User code segment selector (GDT index 3, RPL 3).
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;

/// User data segment selector (GDT index 4, RPL 3).
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;

// ============================================================================
// RFLAGS
// ============================================================================

/// Interrupt Enable Flag.
pub const RFLAGS_IF: u64 = 1 << 9;

/// Reserved bit 1, architecturally always set.
pub const RFLAGS_RESERVED: u64 = 1 << 1;

/// RFLAGS for a task entering user mode for the first time: timer
/// preemption enabled, IOPL 0.
pub const DEFAULT_USER_RFLAGS: u64 = RFLAGS_IF | RFLAGS_RESERVED;
