//! Configuration system for the emulation environment.
//!
//! This module defines the configuration structures used to parameterize a session.
//! It provides:
//! 1. **Defaults:** Baseline address space layout (stack, process heap, `HeapCreate` size).
//! 2. **Structures:** Hierarchical config for general, memory and module-loading settings.
//! 3. **Enums:** Image format and the module load policies.
//!
//! Configuration is supplied as JSON (see [`Config::from_json`]) or built with
//! `Config::default()` / [`Config::for_format`].

use serde::Deserialize;

use crate::modules::LoadPolicy;

/// Default configuration constants for the emulation environment.
mod defaults {
    /// Top of the stack for PE images (initial ESP).
    ///
    /// Leaves room for a 14 MiB image at the customary 0x0040_0000 base.
    pub const PE_STACK_TOP: u32 = 0x0130_0000;

    /// Size of the stack for PE images (1 MiB, the linker default reserve).
    pub const PE_STACK_SIZE: u32 = 0x0010_0000;

    /// Top of the stack for ELF images (start of the kernel half on 32-bit Linux).
    pub const ELF_STACK_TOP: u32 = 0xC000_0000;

    /// Size of the stack for ELF images (16 MiB).
    pub const ELF_STACK_SIZE: u32 = 0x0100_0000;

    /// Base address of the process heap; also the `GetProcessHeap` handle.
    pub const HEAP_BASE: u32 = 0xA000_0000;

    /// Size of the process heap (16 MiB).
    pub const HEAP_SIZE: u32 = 0x0100_0000;

    /// Size used by `HeapCreate` when the caller passes a zero maximum (16 MiB).
    pub const HEAP_CREATE_SIZE: u32 = 0x0100_0000;
}

/// Executable format of the stepped program.
///
/// Selects the default stack layout and whether Win32 segment selectors are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ImageFormat {
    /// Windows PE32.
    #[default]
    #[serde(alias = "PE")]
    Pe,

    /// 32-bit ELF.
    #[serde(alias = "ELF")]
    Elf,
}

/// Root configuration structure.
///
/// Every section and every field is optional in JSON; missing values take their defaults.
///
/// # Example
///
/// ```
/// use x86emu_core::config::{Config, ImageFormat};
/// use x86emu_core::modules::LoadPolicy;
///
/// let json = r#"{
///     "general": { "format": "Elf", "trace_hooks": true },
///     "memory": { "heap_size": 65536 },
///     "modules": { "load_library": "Fake" }
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.general.format, ImageFormat::Elf);
/// assert_eq!(config.memory.heap_size, 65536);
/// assert_eq!(config.memory.stack_top(ImageFormat::Elf), 0xC000_0000);
/// assert_eq!(config.modules.load_library, LoadPolicy::Fake);
/// assert_eq!(config.modules.get_module_handle, LoadPolicy::Ask);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// General session settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Address space layout
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Module loading policies
    #[serde(default)]
    pub modules: ModuleConfig,
}

impl Config {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Default configuration for the given image format.
    pub fn for_format(format: ImageFormat) -> Self {
        let mut config = Self::default();
        config.general.format = format;
        config
    }

    /// Effective initial ESP.
    pub fn stack_top(&self) -> u32 {
        self.memory.stack_top(self.general.format)
    }

    /// Effective stack size.
    pub fn stack_size(&self) -> u32 {
        self.memory.stack_size(self.general.format)
    }
}

/// General session settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralConfig {
    /// Image format of the stepped program
    #[serde(default)]
    pub format: ImageFormat,

    /// Log every hook dispatch at info level, not just unemulated ones
    #[serde(default)]
    pub trace_hooks: bool,
}

/// Address space layout.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Initial ESP; defaults depend on the image format
    #[serde(default)]
    pub stack_top: Option<u32>,

    /// Stack size; defaults depend on the image format
    #[serde(default)]
    pub stack_size: Option<u32>,

    /// Process heap base address
    #[serde(default = "MemoryConfig::default_heap_base")]
    pub heap_base: u32,

    /// Process heap size
    #[serde(default = "MemoryConfig::default_heap_size")]
    pub heap_size: u32,

    /// Heap size used by `HeapCreate` when the caller gives no maximum
    #[serde(default = "MemoryConfig::default_heap_create_size")]
    pub heap_create_size: u32,
}

impl MemoryConfig {
    fn default_heap_base() -> u32 {
        defaults::HEAP_BASE
    }

    fn default_heap_size() -> u32 {
        defaults::HEAP_SIZE
    }

    fn default_heap_create_size() -> u32 {
        defaults::HEAP_CREATE_SIZE
    }

    /// Initial ESP for `format`, honouring an explicit override.
    pub fn stack_top(&self, format: ImageFormat) -> u32 {
        self.stack_top.unwrap_or(match format {
            ImageFormat::Pe => defaults::PE_STACK_TOP,
            ImageFormat::Elf => defaults::ELF_STACK_TOP,
        })
    }

    /// Stack size for `format`, honouring an explicit override.
    pub fn stack_size(&self, format: ImageFormat) -> u32 {
        self.stack_size.unwrap_or(match format {
            ImageFormat::Pe => defaults::PE_STACK_SIZE,
            ImageFormat::Elf => defaults::ELF_STACK_SIZE,
        })
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            stack_top: None,
            stack_size: None,
            heap_base: defaults::HEAP_BASE,
            heap_size: defaults::HEAP_SIZE,
            heap_create_size: defaults::HEAP_CREATE_SIZE,
        }
    }
}

/// Policies applied when a requested module is not resident on the host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleConfig {
    /// Policy for `LoadLibrary` and the import walk
    #[serde(default)]
    pub load_library: LoadPolicy,

    /// Policy for `GetModuleHandle`
    #[serde(default)]
    pub get_module_handle: LoadPolicy,
}
