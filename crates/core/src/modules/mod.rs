//! Module and Handle Registry.
//!
//! This module tracks the libraries a stepped program knows about. It provides:
//! 1. **Descriptors:** Name, handle, persistent id, address range and export table per module.
//! 2. **Host Access:** The `HostEnvironment` capability for resident/loadable real modules.
//! 3. **Registry:** Name/handle/id indices, load policies, address ownership and persistence.

/// Module descriptors, handles and export tables.
pub mod descriptor;

/// Host environment capability and implementations.
pub mod host;

/// The module registry.
pub mod registry;

pub use descriptor::{ExportTable, ModuleDescriptor, ModuleHandle, Symbol};
pub use host::{HostEnvironment, ImageHost, ModuleImage, NoHost};
pub use registry::{FixedPrompt, LoadDecision, LoadPolicy, ModulePrompt, ModuleRegistry};
