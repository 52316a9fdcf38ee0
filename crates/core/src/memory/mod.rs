//! Emulated Address Space.
//!
//! This module implements the flat 32-bit address space the stepped program runs in.
//! It provides:
//! 1. **Regions:** The `MemoryRegion` capability shared by the stack, heaps and image store.
//! 2. **Stack:** A single downward-growing stack region per session.
//! 3. **Heaps:** Independently addressed allocators, including the process heap.
//! 4. **Image Store:** Generic backing store for mapped program images.
//! 5. **Manager:** Byte/word/dword access over the union of all regions, with fault reporting.

/// Heap allocator.
pub mod heap;

/// Generic backing store for mapped images.
pub mod image;

/// Memory manager composing every region.
pub mod manager;

/// Sparse page storage.
pub mod pages;

/// Stack region.
pub mod stack;

pub use heap::EmuHeap;
pub use image::ImageStore;
pub use manager::MemoryManager;
pub use stack::StackRegion;

/// An address range `[base, base + size)` with byte-level access.
///
/// Addresses passed to `read_u8`/`write_u8` are absolute; callers check `contains` first.
pub trait MemoryRegion {
    /// Short name used in diagnostics (e.g. `"stack"`, `"heap"`).
    fn name(&self) -> &str;

    /// Returns `(base, size)` of the region.
    fn address_range(&self) -> (u32, u32);

    /// Returns whether `addr` lies inside the region.
    fn contains(&self, addr: u32) -> bool {
        let (base, size) = self.address_range();
        let addr = u64::from(addr);
        addr >= u64::from(base) && addr < u64::from(base) + u64::from(size)
    }

    /// Returns whether `[base, base + size)` intersects this region.
    fn overlaps(&self, base: u32, size: u32) -> bool {
        let (own_base, own_size) = self.address_range();
        let (a0, a1) = (u64::from(base), u64::from(base) + u64::from(size));
        let (b0, b1) = (u64::from(own_base), u64::from(own_base) + u64::from(own_size));
        a0 < b1 && b0 < a1
    }

    /// Reads one byte.
    fn read_u8(&self, addr: u32) -> u8;

    /// Writes one byte.
    fn write_u8(&mut self, addr: u32, val: u8);
}
