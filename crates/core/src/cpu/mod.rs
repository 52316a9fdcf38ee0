//! Emulated CPU state.
//!
//! Only architectural state lives here; instruction semantics belong to the execute engine
//! that drives a [`crate::Session`].

/// EFLAGS bit constants and condition codes.
pub mod flags;

/// Register file.
pub mod regs;

pub use flags::Condition;
pub use regs::{Reg, RegisterFile, Seg};
