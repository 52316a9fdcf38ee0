//! Execution breakpoints.

use std::collections::HashSet;

use tracing::debug;

/// Unordered set of addresses at which a run stops before executing.
#[derive(Clone, Debug, Default)]
pub struct BreakpointSet {
    addrs: HashSet<u32>,
}

impl BreakpointSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a breakpoint; returns `false` if one was already set at `addr`.
    pub fn add(&mut self, addr: u32) -> bool {
        let added = self.addrs.insert(addr);
        if added {
            debug!(addr, "breakpoint added");
        }
        added
    }

    /// Removes a breakpoint; returns `false` if none was set at `addr`.
    pub fn remove(&mut self, addr: u32) -> bool {
        let removed = self.addrs.remove(&addr);
        if removed {
            debug!(addr, "breakpoint removed");
        }
        removed
    }

    /// Returns whether execution should stop at `addr`.
    #[inline]
    pub fn is_breakpoint(&self, addr: u32) -> bool {
        self.addrs.contains(&addr)
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Returns whether no breakpoints are set.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Breakpoint addresses in ascending order.
    pub fn sorted(&self) -> Vec<u32> {
        let mut addrs: Vec<u32> = self.addrs.iter().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.addrs.clear();
    }
}
