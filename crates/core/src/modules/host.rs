//! Host environment capability.
//!
//! Real modules come from the host: either already resident, or loadable on request. The
//! registry never touches host processes directly; it asks a [`HostEnvironment`].

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use super::descriptor::ExportTable;
use crate::common::ImageError;
use crate::loader::pe;

/// What the registry needs to know about a real module's image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleImage {
    /// `SizeOfImage` from the optional header.
    pub size_of_image: u32,
    /// Export directory contents.
    pub exports: ExportTable,
}

/// Source of real modules.
pub trait HostEnvironment {
    /// Base address of `name` if the host already has it resident.
    fn find_resident(&self, name: &str) -> Option<u32>;

    /// Loads `name` and returns its base address.
    fn load_library(&mut self, name: &str) -> Option<u32>;

    /// Image details of the module resident at `base`.
    fn inspect(&self, base: u32) -> Option<ModuleImage>;
}

/// A host with no modules at all; every module ends up faked or refused.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHost;

impl HostEnvironment for NoHost {
    fn find_resident(&self, _name: &str) -> Option<u32> {
        None
    }

    fn load_library(&mut self, _name: &str) -> Option<u32> {
        None
    }

    fn inspect(&self, _base: u32) -> Option<ModuleImage> {
        None
    }
}

/// Normalises a module name the way the Win32 loader matches them: ASCII case-insensitive,
/// with `.dll` implied when no extension is given.
fn host_key(name: &str) -> String {
    let file = name.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(name);
    let mut key = file.to_ascii_lowercase();
    if !key.contains('.') {
        key.push_str(".dll");
    }
    key
}

/// A host backed by PE images registered up front.
///
/// Each image sits at its preferred base. Images registered as resident are found by
/// `GetModuleHandle`; the others only appear once `LoadLibrary` asks for them.
#[derive(Clone, Debug, Default)]
pub struct ImageHost {
    by_name: HashMap<String, u32>,
    images: BTreeMap<u32, ModuleImage>,
    resident: HashSet<u32>,
}

impl ImageHost {
    /// Creates a host with no images.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a PE32 image and registers it under `name`.
    ///
    /// # Returns
    ///
    /// The image's preferred base, which becomes its module handle.
    pub fn add_image(&mut self, name: &str, data: &[u8], resident: bool) -> Result<u32, ImageError> {
        let (base, image) = pe::inspect_image(data)?;
        self.add_module(name, base, image, resident);
        Ok(base)
    }

    /// Registers an already described module at `base`.
    pub fn add_module(&mut self, name: &str, base: u32, image: ModuleImage, resident: bool) {
        debug!(name, base, exports = image.exports.len(), resident, "host module registered");
        let _ = self.by_name.insert(host_key(name), base);
        let _ = self.images.insert(base, image);
        if resident {
            let _ = self.resident.insert(base);
        }
    }
}

impl HostEnvironment for ImageHost {
    fn find_resident(&self, name: &str) -> Option<u32> {
        self.by_name
            .get(&host_key(name))
            .copied()
            .filter(|base| self.resident.contains(base))
    }

    fn load_library(&mut self, name: &str) -> Option<u32> {
        let base = *self.by_name.get(&host_key(name))?;
        let _ = self.resident.insert(base);
        Some(base)
    }

    fn inspect(&self, base: u32) -> Option<ModuleImage> {
        self.images.get(&base).cloned()
    }
}
