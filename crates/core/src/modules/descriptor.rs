//! Module descriptors and export tables.

use std::fmt;

use crate::common::constants::SYNTHETIC_HANDLE_BASE;

/// Handle of a registered module.
///
/// Real handles are the base address of an image the host actually has; synthetic handles
/// are minted for faked modules and live in the reserved range above
/// [`SYNTHETIC_HANDLE_BASE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleHandle {
    /// Base address of a real image.
    Real(u32),
    /// Faked module, identified by its persistent id.
    Synthetic(u32),
}

impl ModuleHandle {
    /// Numeric handle value as seen by the emulated program.
    pub const fn value(self) -> u32 {
        match self {
            Self::Real(base) => base,
            Self::Synthetic(id) => SYNTHETIC_HANDLE_BASE | id,
        }
    }

    /// Returns whether the handle was minted rather than obtained from the host.
    pub const fn is_synthetic(self) -> bool {
        matches!(self, Self::Synthetic(_))
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.value())
    }
}

/// Symbol reference used for forward export lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol<'a> {
    /// Exported name.
    Name(&'a str),
    /// Export ordinal (biased by the table's ordinal base).
    Ordinal(u16),
}

/// Export directory of a real module, copied out of its image.
///
/// `functions` is indexed by `ordinal - ordinal_base`; `names[i]` maps to
/// `functions[name_ordinals[i]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportTable {
    /// Ordinal of `functions[0]`.
    pub ordinal_base: u32,
    /// Export address table (RVAs; 0 marks an unused slot).
    pub functions: Vec<u32>,
    /// Export name table.
    pub names: Vec<String>,
    /// Export ordinal table (indices into `functions`).
    pub name_ordinals: Vec<u16>,
}

impl ExportTable {
    /// RVA of the function exported as `name`.
    pub fn function_rva_by_name(&self, name: &str) -> Option<u32> {
        let idx = self.names.iter().position(|n| n == name)?;
        let slot = *self.name_ordinals.get(idx)?;
        self.functions
            .get(usize::from(slot))
            .copied()
            .filter(|&rva| rva != 0)
    }

    /// RVA of the function exported with `ordinal`.
    pub fn function_rva_by_ordinal(&self, ordinal: u16) -> Option<u32> {
        let idx = u32::from(ordinal).checked_sub(self.ordinal_base)?;
        self.functions
            .get(usize::try_from(idx).ok()?)
            .copied()
            .filter(|&rva| rva != 0)
    }

    /// Name under which the function at `rva` is exported.
    ///
    /// Functions exported only by ordinal have no name.
    pub fn name_for_rva(&self, rva: u32) -> Option<&str> {
        let slot = self.functions.iter().position(|&f| f == rva)?;
        let slot = u16::try_from(slot).ok()?;
        let idx = self.name_ordinals.iter().position(|&o| o == slot)?;
        self.names.get(idx).map(String::as_str)
    }

    /// Number of export address table slots.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns whether the module exports nothing.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// A module known to the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Name as first requested (matching is case-insensitive).
    pub name: String,
    /// Real or synthetic handle.
    pub handle: ModuleHandle,
    /// Persistent id, unique within a session.
    pub id: u32,
    /// Exclusive end of the module's address range.
    pub range_end: u32,
    /// Export table; empty for synthetic modules.
    pub exports: ExportTable,
}

impl ModuleDescriptor {
    /// Numeric handle, which is also the start of the module's range.
    pub const fn base(&self) -> u32 {
        self.handle.value()
    }

    /// Returns whether `addr` lies in `[handle, range_end)`.
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base() && addr < self.range_end
    }

    /// The id as persisted: high bit set when the handle is synthetic.
    pub const fn persisted_id(&self) -> u32 {
        if self.handle.is_synthetic() {
            self.id | SYNTHETIC_HANDLE_BASE
        } else {
            self.id
        }
    }

    /// Absolute address of an export; synthetic modules export nothing.
    pub fn export_address(&self, symbol: Symbol<'_>) -> Option<u32> {
        let ModuleHandle::Real(base) = self.handle else {
            return None;
        };
        let rva = match symbol {
            Symbol::Name(name) => self.exports.function_rva_by_name(name),
            Symbol::Ordinal(ordinal) => self.exports.function_rva_by_ordinal(ordinal),
        }?;
        Some(base.wrapping_add(rva))
    }

    /// Export name of the function at absolute address `addr`.
    pub fn reverse_lookup(&self, addr: u32) -> Option<&str> {
        let ModuleHandle::Real(base) = self.handle else {
            return None;
        };
        if !self.contains(addr) {
            return None;
        }
        self.exports.name_for_rva(addr - base)
    }
}
