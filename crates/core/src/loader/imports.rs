//! Import table resolution.
//!
//! Walks the `IMAGE_IMPORT_DESCRIPTOR` array of a mapped image. For each imported library the
//! module is found or registered under the `LoadLibrary` policy; for each imported function
//! the address is resolved exactly as `GetProcAddress` would, the `FirstThunk` slot is patched
//! and a hook is installed.

use tracing::{debug, info, warn};

use crate::Session;
use crate::common::Result;
use crate::common::constants::{IMPORT_BY_ORDINAL, IMPORT_DESCRIPTOR_SIZE, IMPORT_HINT_SIZE};
use crate::modules::Symbol;

/// Outcome of an import walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Import descriptors processed.
    pub modules: usize,
    /// Thunks patched with a resolved address.
    pub patched: usize,
    /// Thunks whose name could not be read; these are set to 0.
    pub failed: usize,
}

/// Resolves and patches every import of the image mapped at `image_base`.
///
/// # Arguments
///
/// * `session` - Session whose memory holds the image.
/// * `import_directory` - RVA of the import directory.
/// * `image_base` - Load address of the image.
///
/// # Returns
///
/// Counts of modules and thunks handled. A fault while reading a descriptor or a lookup
/// entry aborts the walk; an unreadable function name only fails that thunk.
pub fn resolve_imports(
    session: &mut Session,
    import_directory: u32,
    image_base: u32,
) -> Result<ImportReport> {
    let policy = session.config().modules.load_library;
    let mut report = ImportReport::default();
    let mut descriptor = image_base.wrapping_add(import_directory);

    loop {
        let mem = &session.memory;
        let original_first_thunk = mem.read_u32(descriptor)?;
        let time_date_stamp = mem.read_u32(descriptor.wrapping_add(4))?;
        let forwarder_chain = mem.read_u32(descriptor.wrapping_add(8))?;
        let name_rva = mem.read_u32(descriptor.wrapping_add(12))?;
        let first_thunk = mem.read_u32(descriptor.wrapping_add(16))?;
        if original_first_thunk | time_date_stamp | forwarder_chain | name_rva | first_thunk == 0 {
            break;
        }

        let library = mem.read_string(image_base.wrapping_add(name_rva))?;
        let handle = session.ensure_module(&library, policy);
        report.modules += 1;
        debug!(library = %library, handle, "import descriptor");

        let lookup = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        for index in 0u32.. {
            let offset = index.wrapping_mul(4);
            let entry = session
                .memory
                .read_u32(image_base.wrapping_add(lookup).wrapping_add(offset))?;
            if entry == 0 {
                break;
            }
            let slot = image_base.wrapping_add(first_thunk).wrapping_add(offset);

            let address = if entry & IMPORT_BY_ORDINAL != 0 {
                Some(session.resolve_proc(handle, Symbol::Ordinal(entry as u16)))
            } else {
                let hint_name = image_base.wrapping_add(entry).wrapping_add(IMPORT_HINT_SIZE);
                match session.memory.read_string(hint_name) {
                    Ok(name) if !name.is_empty() => {
                        Some(session.resolve_proc(handle, Symbol::Name(&name)))
                    }
                    Ok(_) | Err(_) => None,
                }
            };

            if let Some(address) = address {
                session.memory.write_u32(slot, address)?;
                report.patched += 1;
            } else {
                warn!(library = %library, slot, entry, "import name unreadable, thunk cleared");
                session.memory.write_u32(slot, 0)?;
                report.failed += 1;
            }
        }

        descriptor = descriptor.wrapping_add(IMPORT_DESCRIPTOR_SIZE);
    }

    info!(
        modules = report.modules,
        patched = report.patched,
        failed = report.failed,
        "imports resolved"
    );
    Ok(report)
}
