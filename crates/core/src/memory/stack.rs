//! Session stack region.

use super::MemoryRegion;
use super::pages::PageStore;

/// The emulated stack: `[top - size, top)`, growing downward from `top`.
///
/// While the stack is valid ESP stays within `[top - size, top]`; ESP equal to `top`
/// means the stack is empty.
#[derive(Clone, Debug)]
pub struct StackRegion {
    top: u32,
    size: u32,
    store: PageStore,
}

impl StackRegion {
    /// Creates a stack whose first push lands just below `top`.
    ///
    /// A `size` larger than `top` is clamped so the region never wraps below zero.
    pub fn new(top: u32, size: u32) -> Self {
        Self {
            top,
            size: size.min(top),
            store: PageStore::new(),
        }
    }

    /// Highest address (exclusive) of the stack; the initial ESP.
    pub const fn top(&self) -> u32 {
        self.top
    }

    /// Size of the stack in bytes.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Lowest address of the stack.
    pub const fn base(&self) -> u32 {
        self.top - self.size
    }

    /// Returns whether `esp` is a valid stack pointer for this stack.
    pub const fn is_valid_esp(&self, esp: u32) -> bool {
        esp >= self.base() && esp <= self.top
    }
}

impl MemoryRegion for StackRegion {
    fn name(&self) -> &str {
        "stack"
    }

    fn address_range(&self) -> (u32, u32) {
        (self.base(), self.size)
    }

    fn read_u8(&self, addr: u32) -> u8 {
        self.store.read_u8(addr)
    }

    fn write_u8(&mut self, addr: u32, val: u8) {
        self.store.write_u8(addr, val);
    }
}
