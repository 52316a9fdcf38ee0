//! Heap Allocator.
//!
//! This module implements the allocator behind the emulated `malloc` family and the Win32
//! heap, local and virtual allocation calls. It provides:
//! 1. **Placement:** First-fit search over the gaps between live blocks, 8-byte aligned.
//! 2. **Bookkeeping:** A sorted map of live blocks `{address -> requested size}`.
//! 3. **Contracts:** Non-overlapping live blocks, zero-filled `calloc`, content-preserving `realloc`.
//!
//! Exhaustion is not an error: the call returns a null address, as a real allocator would.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::MemoryRegion;
use super::pages::PageStore;
use crate::common::HeapError;
use crate::common::constants::HEAP_ALIGN;

/// Bytes a block of `size` actually occupies; zero-sized requests still get a block.
#[inline]
fn span(size: u32) -> u64 {
    let align = u64::from(HEAP_ALIGN);
    (u64::from(size.max(1)) + align - 1) & !(align - 1)
}

#[inline]
fn align_up(addr: u64) -> u64 {
    let align = u64::from(HEAP_ALIGN);
    (addr + align - 1) & !(align - 1)
}

/// A heap inside the emulated address space.
///
/// The heap's base address doubles as its handle (`HeapCreate` return value).
#[derive(Clone, Debug)]
pub struct EmuHeap {
    base: u32,
    size: u32,
    blocks: BTreeMap<u32, u32>,
    store: PageStore,
}

impl EmuHeap {
    /// Creates an empty heap covering `[base, base + size)`.
    ///
    /// The size is clamped so the heap never extends past the top of the address space.
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            size: size.min(u32::MAX - base),
            blocks: BTreeMap::new(),
            store: PageStore::new(),
        }
    }

    /// Base address (and handle) of the heap.
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Size of the heap's address range.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Requested size of the live block at `addr`.
    pub fn block_size(&self, addr: u32) -> Option<u32> {
        self.blocks.get(&addr).copied()
    }

    /// Live blocks as `(address, requested size)`, in address order.
    pub fn live_blocks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.blocks.iter().map(|(&a, &s)| (a, s))
    }

    /// Number of live blocks.
    pub fn live_count(&self) -> usize {
        self.blocks.len()
    }

    /// Finds the lowest aligned gap of at least `len` bytes.
    fn find_gap(&self, len: u64) -> Option<u32> {
        let end = u64::from(self.base) + u64::from(self.size);
        // Address 0 is the failure value, so it is never handed out.
        let mut cursor = align_up(u64::from(self.base).max(u64::from(HEAP_ALIGN)));
        for (&addr, &size) in &self.blocks {
            if u64::from(addr) >= cursor + len {
                return Some(cursor as u32);
            }
            cursor = cursor.max(align_up(u64::from(addr) + span(size)));
        }
        (cursor + len <= end).then_some(cursor as u32)
    }

    /// Allocates `size` bytes; returns 0 when the heap is exhausted.
    pub fn malloc(&mut self, size: u32) -> u32 {
        match self.find_gap(span(size)) {
            Some(addr) => {
                let _ = self.blocks.insert(addr, size);
                debug!(heap = self.base, addr, size, "malloc");
                addr
            }
            None => {
                debug!(heap = self.base, size, "heap exhausted");
                0
            }
        }
    }

    /// Allocates `count * size` zero-filled bytes.
    ///
    /// Returns 0 on exhaustion and [`HeapError::SizeOverflow`] when the product does not
    /// fit in 32 bits.
    pub fn calloc(&mut self, count: u32, size: u32) -> Result<u32, HeapError> {
        let total = count
            .checked_mul(size)
            .ok_or(HeapError::SizeOverflow { count, size })?;
        let addr = self.malloc(total);
        if addr != 0 {
            self.store.zero(addr, span(total) as u32);
        }
        Ok(addr)
    }

    /// Resizes the block at `addr`, moving it if it cannot grow in place.
    ///
    /// `realloc(0, n)` behaves as `malloc(n)`; `realloc(p, 0)` frees `p` and returns 0.
    /// On failure the original block is left untouched and 0 is returned.
    pub fn realloc(&mut self, addr: u32, new_size: u32) -> u32 {
        if addr == 0 {
            return self.malloc(new_size);
        }
        let Some(old_size) = self.block_size(addr) else {
            warn!(heap = self.base, addr, "realloc of unknown block");
            return 0;
        };
        if new_size == 0 {
            let _ = self.free(addr);
            return 0;
        }

        let limit = self
            .blocks
            .range(addr.saturating_add(1)..)
            .next()
            .map_or(u64::from(self.base) + u64::from(self.size), |(&next, _)| {
                u64::from(next)
            });
        if u64::from(addr) + span(new_size) <= limit {
            let _ = self.blocks.insert(addr, new_size);
            debug!(heap = self.base, addr, old_size, new_size, "realloc in place");
            return addr;
        }

        let moved = self.malloc(new_size);
        if moved == 0 {
            return 0;
        }
        self.store.copy(addr, moved, old_size.min(new_size));
        let _ = self.blocks.remove(&addr);
        debug!(heap = self.base, from = addr, to = moved, new_size, "realloc moved");
        moved
    }

    /// Releases the block at `addr`; returns `false` if no live block starts there.
    pub fn free(&mut self, addr: u32) -> bool {
        if self.blocks.remove(&addr).is_some() {
            debug!(heap = self.base, addr, "free");
            true
        } else {
            debug!(heap = self.base, addr, "free of unknown block ignored");
            false
        }
    }
}

impl MemoryRegion for EmuHeap {
    fn name(&self) -> &str {
        "heap"
    }

    fn address_range(&self) -> (u32, u32) {
        (self.base, self.size)
    }

    fn read_u8(&self, addr: u32) -> u8 {
        self.store.read_u8(addr)
    }

    fn write_u8(&mut self, addr: u32, val: u8) {
        self.store.write_u8(addr, val);
    }
}
