//! Allocation-site structure tracing.
//!
//! Every block returned by an emulated allocator is recorded against the call site that
//! requested it. The engine then reports memory-operand accesses through
//! [`AllocationTracer::record_access`], and each access landing inside a traced block becomes
//! a member of that block's layout at `(offset, width)`.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

/// A heap block traced back to the instruction that allocated it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracedBlock {
    /// Address of the allocating call.
    pub call_site: u32,
    /// Address returned by the allocator.
    pub base: u32,
    /// Requested size in bytes.
    pub size: u32,
    members: BTreeMap<u32, u8>,
}

impl TracedBlock {
    /// Returns whether `addr` lies inside `[base, base + size)`.
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && u64::from(addr) < u64::from(self.base) + u64::from(self.size)
    }

    /// Observed members as `(offset, width)`, ascending by offset.
    pub fn members(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.members.iter().map(|(&off, &width)| (off, width))
    }

    /// Width of the member at `offset`, if one was observed.
    pub fn member(&self, offset: u32) -> Option<u8> {
        self.members.get(&offset).copied()
    }
}

/// Traced allocations, one per call site.
#[derive(Clone, Debug, Default)]
pub struct AllocationTracer {
    blocks: Vec<TracedBlock>,
    by_site: HashMap<u32, usize>,
}

impl AllocationTracer {
    /// Creates an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the block `[base, base + size)` allocated at `call_site`.
    ///
    /// # Returns
    ///
    /// `false` when the call site is already traced (the first block wins) or the
    /// allocation failed (`base == 0`) or was empty.
    pub fn register(&mut self, call_site: u32, base: u32, size: u32) -> bool {
        if base == 0 || size == 0 || self.by_site.contains_key(&call_site) {
            return false;
        }
        let _ = self.by_site.insert(call_site, self.blocks.len());
        self.blocks.push(TracedBlock {
            call_site,
            base,
            size,
            members: BTreeMap::new(),
        });
        debug!(call_site, base, size, "allocation traced");
        true
    }

    /// Finds the traced block holding `addr`, the most recently registered first.
    ///
    /// # Returns
    ///
    /// `(call_site, offset)` of the hit.
    pub fn trace_for(&self, addr: u32) -> Option<(u32, u32)> {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.contains(addr))
            .map(|b| (b.call_site, addr - b.base))
    }

    /// Records a `width`-byte access at `addr` in every traced block holding it.
    ///
    /// A member keeps the width of its first access.
    ///
    /// # Returns
    ///
    /// Number of members added.
    pub fn record_access(&mut self, addr: u32, width: u8) -> usize {
        let mut added = 0;
        for block in self.blocks.iter_mut().filter(|b| b.contains(addr)) {
            let offset = addr - block.base;
            if let Entry::Vacant(slot) = block.members.entry(offset) {
                let _ = slot.insert(width);
                added += 1;
                debug!(call_site = block.call_site, offset, width, "member observed");
            }
        }
        added
    }

    /// The block traced for `call_site`.
    pub fn find(&self, call_site: u32) -> Option<&TracedBlock> {
        self.by_site.get(&call_site).map(|&i| &self.blocks[i])
    }

    /// Traced blocks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TracedBlock> {
        self.blocks.iter()
    }

    /// Number of traced blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns whether nothing is traced.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Forgets every traced block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.by_site.clear();
    }
}
