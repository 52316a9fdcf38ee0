//! Generic backing store for mapped program images.

use super::MemoryRegion;
use super::pages::PageStore;

/// A region holding a mapped image (headers and sections) at its preferred base.
#[derive(Clone, Debug)]
pub struct ImageStore {
    base: u32,
    size: u32,
    store: PageStore,
}

impl ImageStore {
    /// Creates a zero-filled region covering `[base, base + size)`.
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            size: size.min(u32::MAX - base),
            store: PageStore::new(),
        }
    }

    /// Base address of the mapped image.
    pub const fn base(&self) -> u32 {
        self.base
    }
}

impl MemoryRegion for ImageStore {
    fn name(&self) -> &str {
        "image"
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
