//! Image Loading.
//!
//! This module prepares a program image before emulation starts. It provides:
//! 1. **Mapping:** PE32 headers and sections copied into an image store region.
//! 2. **Inspection:** Image base, size and export table of host modules.
//! 3. **Import Resolution:** The import table walk that registers modules, installs hooks
//!    and patches every import thunk.

/// Import table walk.
pub mod imports;

/// PE32 mapping and inspection.
pub mod pe;

pub use imports::{ImportReport, resolve_imports};
pub use pe::{MappedImage, inspect_image, map_image};
