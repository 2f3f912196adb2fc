//! Architecture abstraction layer.
//!
//! Code outside this module talks to the machine through the traits in
//! [`traits`]. Two implementations exist: the x86_64 register layout in
//! [`x86_64`], and the [`hosted`] machine that simulates physical memory,
//! page tables and the per-core root register in ordinary heap memory.

pub mod hosted;
pub mod traits;
pub mod x86_64;

pub use self::x86_64 as current;
pub use traits::*;
