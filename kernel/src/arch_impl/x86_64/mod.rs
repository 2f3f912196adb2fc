//! x86_64 architecture implementation.
//!
//! Segment selectors, RFLAGS defaults and the saved trap frame layout used
//! when entering and leaving user mode.

pub mod constants;
pub mod interrupt_frame;

pub use constants::*;
pub use interrupt_frame::TrapFrame;
