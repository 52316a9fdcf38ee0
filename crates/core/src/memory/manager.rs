//! Emulated memory manager.
//!
//! This module routes emulated address accesses to the region that owns them. It provides:
//! 1. **Region ownership:** One stack, any number of heaps (one of them the process heap),
//!    and image stores for mapped programs.
//! 2. **Access routing:** Byte, word and dword access, little-endian, each byte checked.
//! 3. **Strings:** NUL-terminated string reads for hook arguments and import names.
//! 4. **Host transfer:** Dumping a range to a file and loading a file into memory.
//!
//! Lookup order is stack, then heaps, then images. Regions never overlap, so the order only
//! affects speed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{EmuHeap, ImageStore, MemoryRegion, StackRegion};
use crate::common::constants::{HEAP_PLACEMENT_ALIGN, STRING_GROWTH, STRING_INITIAL_CAPACITY};
use crate::common::{AccessType, MemoryFault, RegionKind, Result};

/// Owner of every region of the emulated address space.
#[derive(Clone, Debug)]
pub struct MemoryManager {
    stack: StackRegion,
    heaps: BTreeMap<u32, EmuHeap>,
    process_heap: Option<u32>,
    images: Vec<ImageStore>,
}

impl MemoryManager {
    /// Creates a manager with a stack and no heaps or images.
    ///
    /// # Arguments
    ///
    /// * `stack_top` - Initial ESP; the stack grows down from here.
    /// * `stack_size` - Size of the stack region in bytes.
    pub fn new(stack_top: u32, stack_size: u32) -> Self {
        Self {
            stack: StackRegion::new(stack_top, stack_size),
            heaps: BTreeMap::new(),
            process_heap: None,
            images: Vec::new(),
        }
    }

    /// Replaces the stack region; the old stack contents are discarded.
    pub fn init_stack(&mut self, top: u32, size: u32) {
        debug!(top, size, "stack initialised");
        self.stack = StackRegion::new(top, size);
    }

    /// The session stack.
    pub const fn stack(&self) -> &StackRegion {
        &self.stack
    }

    /// Returns whether `[base, base + size)` collides with the stack, a heap or an image.
    ///
    /// The heap at `ignore_heap` (if any) is left out of the check.
    fn collides(&self, base: u32, size: u32, ignore_heap: Option<u32>) -> bool {
        self.stack.overlaps(base, size)
            || self
                .heaps
                .values()
                .filter(|h| Some(h.base()) != ignore_heap)
                .any(|h| h.overlaps(base, size))
            || self.images.iter().any(|i| i.overlaps(base, size))
    }

    /// Creates (or replaces) the default process heap.
    ///
    /// # Arguments
    ///
    /// * `base` - Base address; also the heap handle returned by `GetProcessHeap`.
    /// * `size` - Size of the heap's address range.
    ///
    /// # Returns
    ///
    /// `false` if the range is empty or collides with another region.
    pub fn init_heap(&mut self, base: u32, size: u32) -> bool {
        if size == 0 || self.collides(base, size, self.process_heap) {
            warn!(base, size, "process heap range rejected");
            return false;
        }
        if let Some(old) = self.process_heap.take() {
            let _ = self.heaps.remove(&old);
        }
        let _ = self.heaps.insert(base, EmuHeap::new(base, size));
        self.process_heap = Some(base);
        debug!(base, size, "process heap initialised");
        true
    }

    /// Id of the process heap, if one has been created.
    pub const fn process_heap_id(&self) -> Option<u32> {
        self.process_heap
    }

    /// The process heap.
    pub fn process_heap(&self) -> Option<&EmuHeap> {
        self.process_heap.and_then(|id| self.heaps.get(&id))
    }

    /// The process heap, mutably.
    pub fn process_heap_mut(&mut self) -> Option<&mut EmuHeap> {
        self.process_heap.and_then(|id| self.heaps.get_mut(&id))
    }

    /// Creates an additional heap placed after the highest existing heap.
    ///
    /// # Arguments
    ///
    /// * `max_size` - Size of the new heap's address range.
    ///
    /// # Returns
    ///
    /// The new heap's id (its base address), or 0 when no room is left.
    pub fn add_heap(&mut self, max_size: u32) -> u32 {
        if max_size == 0 {
            return 0;
        }
        let after = self.heaps.values().map(|h| u64::from(h.base()) + u64::from(h.size())).max();
        let start = after.unwrap_or_else(|| u64::from(self.stack.top()));
        let align = u64::from(HEAP_PLACEMENT_ALIGN);
        let base = (start + align - 1) & !(align - 1);
        let Ok(base) = u32::try_from(base) else {
            warn!(max_size, "no address space left for a new heap");
            return 0;
        };
        if base == 0
            || u64::from(base) + u64::from(max_size) > u64::from(u32::MAX)
            || self.collides(base, max_size, None)
        {
            warn!(base, max_size, "heap placement rejected");
            return 0;
        }
        let _ = self.heaps.insert(base, EmuHeap::new(base, max_size));
        debug!(base, max_size, "heap created");
        base
    }

    /// Destroys the heap with the given id.
    ///
    /// Returns `false` for unknown ids and for the process heap, which lives as long as
    /// the session.
    pub fn destroy_heap(&mut self, id: u32) -> bool {
        if Some(id) == self.process_heap {
            warn!(id, "refusing to destroy the process heap");
            return false;
        }
        let removed = self.heaps.remove(&id).is_some();
        if removed {
            debug!(id, "heap destroyed");
        }
        removed
    }

    /// Looks up a heap by id.
    pub fn find_heap(&mut self, id: u32) -> Option<&mut EmuHeap> {
        self.heaps.get_mut(&id)
    }

    /// Every heap, in address order.
    pub fn heaps(&self) -> impl Iterator<Item = &EmuHeap> + '_ {
        self.heaps.values()
    }

    /// Reserves an image store for `[base, base + size)`.
    ///
    /// Returns `false` if the range is empty or collides with another region.
    pub fn map_image_region(&mut self, base: u32, size: u32) -> bool {
        if size == 0 || self.collides(base, size, None) {
            warn!(base, size, "image range rejected");
            return false;
        }
        self.images.push(ImageStore::new(base, size));
        info!(base, size, "image region mapped");
        true
    }

    /// Drops every mapped image.
    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    fn heap_at(&self, addr: u32) -> Option<&EmuHeap> {
        self.heaps
            .range(..=addr)
            .next_back()
            .map(|(_, h)| h)
            .filter(|h| h.contains(addr))
    }

    fn region(&self, addr: u32) -> Option<&dyn MemoryRegion> {
        if self.stack.contains(addr) {
            return Some(&self.stack);
        }
        if let Some(heap) = self.heap_at(addr) {
            return Some(heap);
        }
        self.images
            .iter()
            .find(|i| i.contains(addr))
            .map(|i| i as &dyn MemoryRegion)
    }

    fn region_mut(&mut self, addr: u32) -> Option<&mut dyn MemoryRegion> {
        if self.stack.contains(addr) {
            return Some(&mut self.stack);
        }
        let heap_base = self.heap_at(addr).map(EmuHeap::base);
        if let Some(base) = heap_base {
            return self.heaps.get_mut(&base).map(|h| h as &mut dyn MemoryRegion);
        }
        self.images
            .iter_mut()
            .find(|i| i.contains(addr))
            .map(|i| i as &mut dyn MemoryRegion)
    }

    /// Classifies `addr`; `None` means any access would fault.
    pub fn region_of(&self, addr: u32) -> Option<RegionKind> {
        if self.stack.contains(addr) {
            Some(RegionKind::Stack)
        } else if let Some(heap) = self.heap_at(addr) {
            Some(RegionKind::Heap(heap.base()))
        } else if self.images.iter().any(|i| i.contains(addr)) {
            Some(RegionKind::Image)
        } else {
            None
        }
    }

    /// Returns whether any region covers `addr`.
    pub fn is_mapped(&self, addr: u32) -> bool {
        self.region(addr).is_some()
    }

    /// Reads one byte.
    pub fn read_u8(&self, addr: u32) -> std::result::Result<u8, MemoryFault> {
        self.region(addr)
            .map(|r| r.read_u8(addr))
            .ok_or(MemoryFault::read(addr))
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, addr: u32, val: u8) -> std::result::Result<(), MemoryFault> {
        let region = self.region_mut(addr).ok_or(MemoryFault::write(addr))?;
        region.write_u8(addr, val);
        Ok(())
    }

    /// Reads a little-endian word.
    pub fn read_u16(&self, addr: u32) -> std::result::Result<u16, MemoryFault> {
        let lo = self.read_u8(addr)?;
        let hi = self.read_u8(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Writes a little-endian word.
    pub fn write_u16(&mut self, addr: u32, val: u16) -> std::result::Result<(), MemoryFault> {
        self.write_bytes(addr, &val.to_le_bytes())
    }

    /// Reads a little-endian dword.
    pub fn read_u32(&self, addr: u32) -> std::result::Result<u32, MemoryFault> {
        let mut raw = [0u8; 4];
        for (i, b) in (0u32..).zip(raw.iter_mut()) {
            *b = self.read_u8(addr.wrapping_add(i))?;
        }
        Ok(u32::from_le_bytes(raw))
    }

    /// Writes a little-endian dword.
    pub fn write_u32(&mut self, addr: u32, val: u32) -> std::result::Result<(), MemoryFault> {
        self.write_bytes(addr, &val.to_le_bytes())
    }

    /// Reads `len` bytes starting at `addr`.
    pub fn read_bytes(&self, addr: u32, len: u32) -> std::result::Result<Vec<u8>, MemoryFault> {
        (0..len).map(|i| self.read_u8(addr.wrapping_add(i))).collect()
    }

    /// Writes `data` starting at `addr`.
    ///
    /// Every byte is checked before any is written, so a faulting write leaves memory as it was.
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> std::result::Result<(), MemoryFault> {
        if let Some(bad) = (0u32..)
            .take(data.len())
            .map(|i| addr.wrapping_add(i))
            .find(|&a| !self.is_mapped(a))
        {
            return Err(MemoryFault {
                addr: bad,
                access: AccessType::Write,
            });
        }
        for (i, &b) in (0u32..).zip(data) {
            self.write_u8(addr.wrapping_add(i), b)?;
        }
        Ok(())
    }

    /// Reads a NUL-terminated string.
    ///
    /// A null address yields an empty string. Bytes are decoded lossily; module and symbol
    /// names are ASCII in practice.
    pub fn read_string(&self, addr: u32) -> std::result::Result<String, MemoryFault> {
        if addr == 0 {
            return Ok(String::new());
        }
        let mut buf = Vec::with_capacity(STRING_INITIAL_CAPACITY);
        let mut cursor = addr;
        loop {
            let b = self.read_u8(cursor)?;
            if b == 0 {
                break;
            }
            if buf.len() == buf.capacity() {
                buf.reserve_exact(STRING_GROWTH);
            }
            buf.push(b);
            cursor = cursor.wrapping_add(1);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Copies `[start, end]` (inclusive) out of emulated memory.
    ///
    /// An inverted range yields an empty buffer.
    pub fn dump_range(&self, start: u32, end: u32) -> std::result::Result<Vec<u8>, MemoryFault> {
        if end < start {
            return Ok(Vec::new());
        }
        (start..=end).map(|a| self.read_u8(a)).collect()
    }

    /// Writes `[start, end]` (inclusive) to a host file.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub fn dump_range_to_file(&self, path: impl AsRef<Path>, start: u32, end: u32) -> Result<usize> {
        let bytes = self.dump_range(start, end)?;
        fs::write(path.as_ref(), &bytes)?;
        info!(start, end, path = %path.as_ref().display(), "memory range dumped");
        Ok(bytes.len())
    }

    /// Copies a host file into emulated memory at `addr`.
    ///
    /// # Returns
    ///
    /// The number of bytes loaded.
    pub fn load_file(&mut self, path: impl AsRef<Path>, addr: u32) -> Result<usize> {
        let bytes = fs::read(path.as_ref())?;
        self.write_bytes(addr, &bytes)?;
        info!(addr, len = bytes.len(), path = %path.as_ref().display(), "file loaded into memory");
        Ok(bytes.len())
    }
}
