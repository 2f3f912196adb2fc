//! Memory layout and per-task address spaces.

pub mod address_space;
pub mod layout;

pub use address_space::AddressSpace;
