//! Module registry.
//!
//! This module maps names, handles and persistent ids to module descriptors. It provides:
//! 1. **Registration:** `add_module` with host probing and the load policies.
//! 2. **Lookup:** By name (case-insensitive), by handle or id, and by contained address.
//! 3. **Exports:** Forward lookup by name/ordinal and reverse lookup by address.
//! 4. **Persistence:** The saved module list (`count`, then `id`, `len`, `name\0` per module).
//!
//! Descriptors live in an arena; the maps hold arena indices. At most one descriptor exists
//! per name and per handle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::descriptor::{ExportTable, ModuleDescriptor, ModuleHandle, Symbol};
use super::host::{HostEnvironment, NoHost};
use crate::common::constants::SYNTHETIC_HANDLE_BASE;
use crate::common::{ByteReader, StateError};

/// What to do when a requested module is not resident on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoadPolicy {
    /// Consult the [`ModulePrompt`].
    #[default]
    Ask,
    /// Always ask the host to load it.
    Load,
    /// Never load it; the request yields handle 0.
    Never,
    /// Always mint a synthetic handle.
    Fake,
}

/// Answer of a [`ModulePrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDecision {
    /// Ask the host to load the module.
    Load,
    /// Leave the module unregistered.
    Skip,
    /// Register it under a synthetic handle.
    Fake,
}

/// Decision point consulted under [`LoadPolicy::Ask`].
pub trait ModulePrompt {
    /// Decides what to do about `name`, which the host does not have resident.
    fn decide(&mut self, name: &str) -> LoadDecision;
}

/// A prompt that always gives the same answer; used by non-interactive front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrompt(pub LoadDecision);

impl ModulePrompt for FixedPrompt {
    fn decide(&mut self, _name: &str) -> LoadDecision {
        self.0
    }
}

/// Registry of every module the session knows about.
pub struct ModuleRegistry {
    host: Box<dyn HostEnvironment>,
    prompt: Box<dyn ModulePrompt>,
    modules: Vec<ModuleDescriptor>,
    by_name: HashMap<String, usize>,
    by_handle: BTreeMap<u32, usize>,
    by_id: HashMap<u32, usize>,
    next_id: u32,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(Box::new(NoHost), Box::new(FixedPrompt(LoadDecision::Fake)))
    }
}

impl ModuleRegistry {
    /// Creates an empty registry over `host`, consulting `prompt` under [`LoadPolicy::Ask`].
    pub fn new(host: Box<dyn HostEnvironment>, prompt: Box<dyn ModulePrompt>) -> Self {
        Self {
            host,
            prompt,
            modules: Vec::new(),
            by_name: HashMap::new(),
            by_handle: BTreeMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
        }
    }

    /// Replaces the decision prompt.
    pub fn set_prompt(&mut self, prompt: Box<dyn ModulePrompt>) {
        self.prompt = prompt;
    }

    /// The host environment.
    pub fn host(&self) -> &dyn HostEnvironment {
        self.host.as_ref()
    }

    /// Id the next new module will receive.
    pub const fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns whether no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> + '_ {
        self.modules.iter()
    }

    /// Looks up a module by name, ignoring ASCII case.
    pub fn find_by_name(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.modules[idx])
    }

    /// Looks up a module by exact handle, falling back to its id.
    ///
    /// The id fallback accepts handles from sessions that predate synthetic handle tagging.
    pub fn find_by_handle(&self, handle_or_id: u32) -> Option<&ModuleDescriptor> {
        self.by_handle
            .get(&handle_or_id)
            .or_else(|| self.by_id.get(&handle_or_id))
            .map(|&idx| &self.modules[idx])
    }

    /// Finds or registers `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Module name as the program requested it.
    /// * `requested_id` - 0 for a fresh request; a persisted id (synthetic-tagged or not)
    ///   when restoring a saved module list.
    /// * `policy` - What to do when the host does not have the module resident.
    ///
    /// # Returns
    ///
    /// The module's descriptor, or `None` when the policy or prompt refuses it or the host
    /// cannot load it.
    pub fn add_module(
        &mut self,
        name: &str,
        requested_id: u32,
        policy: LoadPolicy,
    ) -> Option<&ModuleDescriptor> {
        let key = name.to_ascii_lowercase();
        if let Some(&idx) = self.by_name.get(&key) {
            return self.modules.get(idx);
        }

        let restoring = requested_id != 0;
        let stored_id = requested_id & !SYNTHETIC_HANDLE_BASE;
        let handle = if requested_id & SYNTHETIC_HANDLE_BASE != 0 {
            ModuleHandle::Synthetic(stored_id)
        } else if let Some(base) = self.host.find_resident(name) {
            ModuleHandle::Real(base)
        } else {
            self.acquire(name, restoring, stored_id, policy)?
        };

        if let Some(&idx) = self.by_handle.get(&handle.value()) {
            debug!(name, handle = %handle, "name aliased to an existing module");
            let _ = self.by_name.insert(key, idx);
            return self.modules.get(idx);
        }

        let id = match handle {
            ModuleHandle::Synthetic(id) => id,
            ModuleHandle::Real(_) if restoring && !self.by_id.contains_key(&stored_id) => {
                stored_id
            }
            ModuleHandle::Real(_) => self.next_id,
        };
        self.next_id = self.next_id.max(id.saturating_add(1));

        let (range_end, exports) = match handle {
            ModuleHandle::Real(base) => match self.host.inspect(base) {
                Some(image) => (base.saturating_add(image.size_of_image), image.exports),
                None => (base.saturating_add(1), ExportTable::default()),
            },
            ModuleHandle::Synthetic(_) => {
                (handle.value().saturating_add(1), ExportTable::default())
            }
        };

        let idx = self.modules.len();
        self.modules.push(ModuleDescriptor {
            name: name.to_owned(),
            handle,
            id,
            range_end,
            exports,
        });
        let _ = self.by_name.insert(key, idx);
        let _ = self.by_handle.insert(handle.value(), idx);
        let _ = self.by_id.insert(id, idx);
        info!(name, handle = %handle, id, "module registered");
        self.modules.get(idx)
    }

    /// Applies the load policy to a module the host does not have resident.
    fn acquire(
        &mut self,
        name: &str,
        restoring: bool,
        stored_id: u32,
        policy: LoadPolicy,
    ) -> Option<ModuleHandle> {
        let decision = match policy {
            LoadPolicy::Never if restoring => LoadDecision::Skip,
            LoadPolicy::Never => return None,
            LoadPolicy::Ask if !restoring => self.prompt.decide(name),
            LoadPolicy::Ask | LoadPolicy::Load => LoadDecision::Load,
            LoadPolicy::Fake => LoadDecision::Fake,
        };
        let loaded = match decision {
            LoadDecision::Load => self.host.load_library(name).map(ModuleHandle::Real),
            LoadDecision::Skip => None,
            LoadDecision::Fake => {
                let id = if restoring { stored_id } else { self.next_id };
                Some(ModuleHandle::Synthetic(id))
            }
        };
        match loaded {
            Some(handle) => Some(handle),
            // A module that was real when saved is kept under its old id.
            None if restoring => {
                warn!(name, id = stored_id, "saved module unavailable, faking it");
                Some(ModuleHandle::Synthetic(stored_id))
            }
            None => {
                debug!(name, ?decision, "module not registered");
                None
            }
        }
    }

    /// Module whose `[handle, range_end)` contains `addr`.
    ///
    /// When ranges nest, the module with the largest handle wins.
    pub fn module_from_address(&self, addr: u32) -> Option<&ModuleDescriptor> {
        self.by_handle
            .range(..=addr)
            .rev()
            .map(|(_, &idx)| &self.modules[idx])
            .find(|m| m.contains(addr))
    }

    /// Name of the export at `addr`, if `addr` is exactly an exported function of a real
    /// module.
    pub fn reverse_lookup_export(&self, addr: u32) -> Option<&str> {
        self.module_from_address(addr)?.reverse_lookup(addr)
    }

    /// Forward lookup of an export of the module with handle (or id) `handle`.
    pub fn export_address(&self, handle: u32, symbol: Symbol<'_>) -> Option<u32> {
        self.find_by_handle(handle)?.export_address(symbol)
    }

    /// Forgets every module and restarts id assignment.
    pub fn clear(&mut self) {
        self.modules.clear();
        self.by_name.clear();
        self.by_handle.clear();
        self.by_id.clear();
        self.next_id = 1;
    }

    /// Appends the module list to `out`.
    pub fn save(&self, out: &mut Vec<u8>) {
        let count = i32::try_from(self.modules.len()).unwrap_or(i32::MAX);
        out.extend_from_slice(&count.to_le_bytes());
        for m in self.modules.iter().take(count as usize) {
            out.extend_from_slice(&m.persisted_id().to_le_bytes());
            let len = i32::try_from(m.name.len() + 1).unwrap_or(i32::MAX);
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(m.name.as_bytes());
            out.push(0);
        }
    }

    /// Replaces the registry contents with a saved module list.
    ///
    /// Each record is replayed through [`ModuleRegistry::add_module`] with its stored id.
    /// Nothing is changed when the list is malformed.
    pub fn load(&mut self, reader: &mut ByteReader<'_>, policy: LoadPolicy) -> Result<(), StateError> {
        let count = reader.len_field()?;
        let mut records = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let id = reader.u32()?;
            let len = reader.len_field()?;
            let raw = reader.bytes(len)?;
            let name = raw.split(|&b| b == 0).next().unwrap_or_default();
            let name = std::str::from_utf8(name).map_err(|_| StateError::BadName)?;
            records.push((id, name.to_owned()));
        }

        self.clear();
        let mut max_id = 0;
        for (id, name) in &records {
            max_id = max_id.max(id & !SYNTHETIC_HANDLE_BASE);
            if self.add_module(name, *id, policy).is_none() {
                warn!(name, id, "saved module dropped");
            }
        }
        self.next_id = self.next_id.max(max_id.saturating_add(1));
        debug!(count, next_id = self.next_id, "module list restored");
        Ok(())
    }
}
