//! x86 emulation environment library.
//!
//! This crate implements the runtime substrate beneath an x86 instruction-stepping tool:
//! 1. **CPU:** Register file, EFLAGS bits and condition-code queries.
//! 2. **Memory:** Flat 32-bit address space made of a stack, heaps and image stores.
//! 3. **Modules:** Registry of real and faked libraries with their export tables.
//! 4. **Hooks:** Native emulations of library calls the stepped program makes.
//! 5. **Loader:** PE32 mapping and import thunk resolution.
//! 6. **Session:** The owned context tying everything together, with run control and persistence.
//!
//! Instruction decode and execute are not part of this crate; an engine drives a
//! [`Session`] through the [`InstructionStepper`] trait.

/// Common types and constants (errors, access kinds, state codec).
pub mod common;
/// Session configuration (defaults, image format, load policies).
pub mod config;
/// CPU register state.
pub mod cpu;
/// Breakpoints.
pub mod debug;
/// Library call interception.
pub mod hooks;
/// PE mapping and import resolution.
pub mod loader;
/// Emulated address space.
pub mod memory;
/// Module and handle registry.
pub mod modules;
/// The emulation session.
pub mod session;

/// Root configuration type; use `Config::default()` or [`Config::from_json`].
pub use crate::config::Config;
/// Error and result types shared by every operation.
pub use crate::common::{EmuError, Result};
/// The session and its run-control types.
pub use crate::session::{InstructionStepper, LoadedImage, Session, StopReason};
