//! Memory Access Types.
//!
//! This module defines the classification of emulated memory accesses. These types are used for:
//! 1. **Fault Reporting:** Telling the execute engine whether a faulting access was a read or a write.
//! 2. **Region Classification:** Naming which part of the address space an address belongs to.

/// Type of memory access operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Instruction fetch by the execute engine.
    Fetch,

    /// Data read (operand load, stack pop, string read).
    Read,

    /// Data write (operand store, stack push, thunk patch).
    Write,
}

/// The kind of region an emulated address falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    /// The session stack.
    Stack,

    /// A heap, identified by its base address (which doubles as its handle).
    Heap(u32),

    /// A mapped program image in the generic backing store.
    Image,
}
