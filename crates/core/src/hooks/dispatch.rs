//! Hook dispatch table.
//!
//! Every hooked call target has exactly one [`HookNode`]. Nodes are found by address (when
//! the execute engine reaches a call target) or by name (when `GetProcAddress` or the import
//! walk resolves a function). Functions with no real address receive a synthetic one:
//! emulated functions count up from [`EMULATED_STUB_BASE`], unemulated ones count down from
//! [`UNEMULATED_STUB_TOP`].

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::handlers::{HOOK_TABLE, unemulated};
use crate::Session;
use crate::common::Result;
use crate::common::constants::{EMULATED_STUB_BASE, UNEMULATED_STUB_TOP};

/// Native handler for a hooked function.
///
/// Receives the session and the hooked address. Handlers take their arguments from the
/// stack (popping them for stdcall functions) and leave the result in EAX.
pub type HookFn = fn(&mut Session, u32) -> Result<()>;

/// Static association of a library function name with its emulation.
#[derive(Clone, Copy)]
pub struct HookEntry {
    /// Exported function name (case-sensitive).
    pub name: &'static str,
    /// Emulation.
    pub handler: HookFn,
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A live hook.
#[derive(Clone)]
pub struct HookNode {
    /// Function name.
    pub name: String,
    /// Call-target address (real or synthetic).
    pub address: u32,
    /// Handler invoked on dispatch.
    pub handler: HookFn,
    /// Id of the module the function belongs to (0 if unknown).
    pub module_id: u32,
    /// Whether `handler` is a real emulation rather than the unemulated stub.
    pub emulated: bool,
    /// Number of dispatches so far.
    pub calls: u64,
}

impl fmt::Debug for HookNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookNode")
            .field("name", &self.name)
            .field("address", &format_args!("{:#010x}", self.address))
            .field("module_id", &self.module_id)
            .field("emulated", &self.emulated)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Table of live hooks with name and address indices.
#[derive(Debug)]
pub struct HookDispatch {
    table: &'static [HookEntry],
    nodes: Vec<HookNode>,
    by_address: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
    next_emulated: u32,
    next_unemulated: u32,
}

impl Default for HookDispatch {
    fn default() -> Self {
        Self::new(HOOK_TABLE)
    }
}

impl HookDispatch {
    /// Creates an empty dispatch table backed by the given emulations.
    pub fn new(table: &'static [HookEntry]) -> Self {
        Self {
            table,
            nodes: Vec::new(),
            by_address: HashMap::new(),
            by_name: HashMap::new(),
            next_emulated: EMULATED_STUB_BASE,
            next_unemulated: UNEMULATED_STUB_TOP,
        }
    }

    /// Emulation registered for `name`, if any.
    pub fn emulation_for(&self, name: &str) -> Option<HookFn> {
        self.table.iter().find(|e| e.name == name).map(|e| e.handler)
    }

    /// Hooks `name` at `address`, binding it to its emulation or to the unemulated stub.
    ///
    /// Idempotent: a name that is already hooked returns its existing node, and an address
    /// that is already hooked gains `name` as an alias.
    pub fn check_for_hook(&mut self, name: &str, address: u32, module_id: u32) -> &HookNode {
        if let Some(&idx) = self.by_name.get(name) {
            return &self.nodes[idx];
        }
        if let Some(&idx) = self.by_address.get(&address) {
            debug!(name, address, existing = %self.nodes[idx].name, "hook aliased");
            let _ = self.by_name.insert(name.to_owned(), idx);
            return &self.nodes[idx];
        }

        let (handler, emulated) = match self.emulation_for(name) {
            Some(handler) => (handler, true),
            None => (unemulated as HookFn, false),
        };
        let idx = self.nodes.len();
        self.nodes.push(HookNode {
            name: name.to_owned(),
            address,
            handler,
            module_id,
            emulated,
            calls: 0,
        });
        let _ = self.by_name.insert(name.to_owned(), idx);
        let _ = self.by_address.insert(address, idx);
        debug!(name, address, module_id, emulated, "hook installed");
        &self.nodes[idx]
    }

    /// Returns the address `name` resolves to, installing a hook on first use.
    ///
    /// # Arguments
    ///
    /// * `name` - Function name.
    /// * `real_address` - The function's address in its module, when the module is real and
    ///   exports it.
    /// * `module_id` - Owning module id (0 if unknown).
    ///
    /// # Returns
    ///
    /// The existing hook's address, else `real_address`, else a fresh synthetic address.
    pub fn resolve_by_name(&mut self, name: &str, real_address: Option<u32>, module_id: u32) -> u32 {
        if let Some(&idx) = self.by_name.get(name) {
            return self.nodes[idx].address;
        }
        let address = match real_address {
            Some(address) => address,
            None => self.mint(self.emulation_for(name).is_some()),
        };
        self.check_for_hook(name, address, module_id).address
    }

    /// Hands out the next unused synthetic address.
    fn mint(&mut self, emulated: bool) -> u32 {
        loop {
            let address = if emulated {
                let a = self.next_emulated;
                self.next_emulated = a.wrapping_add(1);
                a
            } else {
                let a = self.next_unemulated;
                self.next_unemulated = a.wrapping_sub(1);
                a
            };
            if !self.by_address.contains_key(&address) {
                return address;
            }
        }
    }

    /// Hook installed at `address`.
    pub fn find_by_address(&self, address: u32) -> Option<&HookNode> {
        self.by_address.get(&address).map(|&idx| &self.nodes[idx])
    }

    /// Hook installed for `name` (case-sensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&HookNode> {
        self.by_name.get(name).map(|&idx| &self.nodes[idx])
    }

    /// Counts a dispatch of the hook at `address` and returns its handler.
    pub(crate) fn record_call(&mut self, address: u32) -> Option<(HookFn, bool)> {
        let idx = *self.by_address.get(&address)?;
        let node = &mut self.nodes[idx];
        node.calls += 1;
        Some((node.handler, node.emulated))
    }

    /// Live hooks in installation order.
    pub fn iter(&self) -> impl Iterator<Item = &HookNode> + '_ {
        self.nodes.iter()
    }

    /// Number of live hooks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether no hooks are installed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Removes every hook and restarts synthetic address minting.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_address.clear();
        self.by_name.clear();
        self.next_emulated = EMULATED_STUB_BASE;
        self.next_unemulated = UNEMULATED_STUB_TOP;
    }
}
