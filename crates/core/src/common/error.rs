//! Error definitions.
//!
//! This module defines the failure kinds of the emulation environment:
//! 1. **Memory Faults:** Accesses outside every known region, reported to the execute engine.
//! 2. **Allocator Errors:** Requests that cannot be expressed as a heap size.
//! 3. **State Errors:** Malformed saved-session buffers.
//! 4. **Image Errors:** PE images that cannot be parsed or mapped.
//!
//! Allocator exhaustion, unknown heaps and unresolved symbols are not errors; they are
//! reported as null/`false` results so emulation can continue.

use thiserror::Error;

use super::data::AccessType;

/// Access to an address that no region of the emulated address space covers.
///
/// The core never recovers from this locally; the execute engine decides whether to
/// simulate a trap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{access:?} of unmapped address {addr:#010x}")]
pub struct MemoryFault {
    /// The faulting emulated address.
    pub addr: u32,
    /// Whether the access was a read, write or fetch.
    pub access: AccessType,
}

impl MemoryFault {
    /// Creates a read fault at `addr`.
    pub const fn read(addr: u32) -> Self {
        Self {
            addr,
            access: AccessType::Read,
        }
    }

    /// Creates a write fault at `addr`.
    pub const fn write(addr: u32) -> Self {
        Self {
            addr,
            access: AccessType::Write,
        }
    }
}

/// Heap requests that cannot be serviced at all (as opposed to exhaustion).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum HeapError {
    /// `count * size` does not fit in 32 bits.
    #[error("calloc size overflow: {count} * {size} exceeds the address space")]
    SizeOverflow {
        /// Element count requested.
        count: u32,
        /// Element size requested.
        size: u32,
    },
}

/// Errors raised while decoding a saved session or module list.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    /// The buffer ended before a complete field could be read.
    #[error("state buffer truncated at offset {offset} (wanted {wanted} more bytes)")]
    Truncated {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Number of bytes the field needed.
        wanted: usize,
    },

    /// The buffer does not start with the session magic.
    #[error("bad state magic {0:#010x}")]
    BadMagic(u32),

    /// The buffer was written by an incompatible layout version.
    #[error("unsupported state version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found in the buffer.
        major: u16,
        /// Minor version found in the buffer.
        minor: u16,
    },

    /// A count or length field is negative.
    #[error("invalid length field {0}")]
    BadLength(i32),

    /// A module name is not valid UTF-8.
    #[error("module name is not valid UTF-8")]
    BadName,
}

/// Errors raised while parsing or mapping a PE image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The `object` crate rejected the image.
    #[error("failed to parse PE image: {0}")]
    Parse(#[from] object::read::Error),

    /// The image range collides with the stack, a heap or another image.
    #[error("image range {base:#010x}+{size:#x} overlaps an existing region")]
    Overlap {
        /// Preferred image base.
        base: u32,
        /// `SizeOfImage`.
        size: u32,
    },

    /// Writing headers or sections, or walking imports, touched unmapped memory.
    #[error(transparent)]
    Memory(#[from] MemoryFault),
}

/// Top-level error type for emulation operations.
#[derive(Debug, Error)]
pub enum EmuError {
    /// An access outside the emulated address space.
    #[error(transparent)]
    Memory(#[from] MemoryFault),

    /// An allocator request that cannot be expressed.
    #[error(transparent)]
    Heap(#[from] HeapError),

    /// A program image could not be mapped.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A saved session could not be restored.
    #[error(transparent)]
    State(#[from] StateError),

    /// The execute engine reported a failure of its own.
    #[error("instruction at {eip:#010x} failed: {reason}")]
    Execute {
        /// Address of the failing instruction.
        eip: u32,
        /// Engine-provided description.
        reason: String,
    },

    /// Host file I/O failed while dumping or loading a memory range.
    #[error("host I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for emulation operations.
pub type Result<T> = std::result::Result<T, EmuError>;
