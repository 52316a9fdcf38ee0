//! Common utilities and types used throughout the emulation environment.
//!
//! This module provides fundamental building blocks that are shared across all components.
//! It includes:
//! 1. **Constants:** Reserved address ranges, PE geometry and persistence tags.
//! 2. **Memory Access:** Access and region classification.
//! 3. **Error Handling:** Memory faults, allocator, state and image errors.
//! 4. **Codec:** A little-endian cursor for saved state buffers.

/// Little-endian reader for persisted state.
pub mod codec;

/// Common constants used throughout the emulator.
pub mod constants;

/// Memory access and region type definitions.
pub mod data;

/// Error types.
pub mod error;

pub use codec::ByteReader;
pub use data::{AccessType, RegionKind};
pub use error::{EmuError, HeapError, ImageError, MemoryFault, Result, StateError};
