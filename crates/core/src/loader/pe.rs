//! PE32 image mapping and inspection.
//!
//! Parsing is done with the `object` crate; only 32-bit images are accepted.

use object::pe::IMAGE_DIRECTORY_ENTRY_IMPORT;
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile32};
use object::{LittleEndian as LE, Object, ObjectSection};
use tracing::{debug, info};

use crate::common::ImageError;
use crate::memory::MemoryManager;
use crate::modules::{ExportTable, ModuleImage};

/// Layout of an image mapped by [`map_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedImage {
    /// Preferred (and actual) load address.
    pub image_base: u32,
    /// `SizeOfImage`.
    pub size_of_image: u32,
    /// Absolute entry point address.
    pub entry: u32,
    /// RVA of the import directory, if the image has one.
    pub import_directory: Option<u32>,
}

/// Maps a PE32 image at its preferred base.
///
/// The headers and every section's raw data are copied into a fresh image store region;
/// the rest of the image reads as zero.
///
/// # Arguments
///
/// * `memory` - Address space to map into.
/// * `data` - Raw image file contents.
///
/// # Returns
///
/// The mapped layout, or an error if the image cannot be parsed or its range is taken.
pub fn map_image(memory: &mut MemoryManager, data: &[u8]) -> Result<MappedImage, ImageError> {
    let pe = PeFile32::parse(data)?;
    let opt = pe.nt_headers().optional_header();
    let image_base = opt.image_base() as u32;
    let size_of_image = opt.size_of_image();

    if !memory.map_image_region(image_base, size_of_image) {
        return Err(ImageError::Overlap {
            base: image_base,
            size: size_of_image,
        });
    }

    let headers = data.len().min(opt.size_of_headers() as usize);
    memory.write_bytes(image_base, &data[..headers])?;
    for section in pe.sections() {
        let bytes = section.data()?;
        let addr = section.address() as u32;
        debug!(name = section.name().unwrap_or("?"), addr, len = bytes.len(), "section mapped");
        memory.write_bytes(addr, bytes)?;
    }

    let import_directory = pe
        .data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT)
        .map(|dir| dir.virtual_address.get(LE))
        .filter(|&rva| rva != 0);
    let mapped = MappedImage {
        image_base,
        size_of_image,
        entry: image_base.wrapping_add(opt.address_of_entry_point()),
        import_directory,
    };
    info!(
        image_base,
        size_of_image,
        entry = mapped.entry,
        "image mapped"
    );
    Ok(mapped)
}

/// Reads the preferred base, size and export table of a PE32 image.
pub fn inspect_image(data: &[u8]) -> Result<(u32, ModuleImage), ImageError> {
    let pe = PeFile32::parse(data)?;
    let opt = pe.nt_headers().optional_header();
    let base = opt.image_base() as u32;

    let mut exports = ExportTable::default();
    if let Some(table) = pe.export_table()? {
        exports.ordinal_base = table.ordinal_base();
        exports.functions = table.addresses().iter().map(|a| a.get(LE)).collect();
        exports.name_ordinals = table.name_ordinals().iter().map(|o| o.get(LE)).collect();
        exports.names = table
            .name_pointers()
            .iter()
            .map(|p| {
                table
                    .name_from_pointer(p.get(LE))
                    .map(|raw| String::from_utf8_lossy(raw).into_owned())
            })
            .collect::<Result<_, _>>()?;
    }

    Ok((
        base,
        ModuleImage {
            size_of_image: opt.size_of_image(),
            exports,
        },
    ))
}
