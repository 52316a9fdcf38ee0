//! Global Emulation Constants.
//!
//! This module defines constants shared across the emulation environment. It includes:
//! 1. **Address Space Layout:** Reserved ranges for synthetic module handles and hook stubs.
//! 2. **Image Format:** PE import table geometry and ordinal encoding.
//! 3. **Allocator:** Heap alignment and default heap sizes.
//! 4. **Persistence:** Magic and version tags for saved session state.

/// Base of the reserved range for synthetic (faked) module handles.
///
/// A synthetic handle is `SYNTHETIC_HANDLE_BASE | id`. The same bit tags a
/// persisted module id whose handle was synthetic.
pub const SYNTHETIC_HANDLE_BASE: u32 = 0x8000_0000;

/// First address handed out to emulated functions that have no real address.
///
/// Emulated stubs count upward from here; unemulated stubs count downward from
/// [`UNEMULATED_STUB_TOP`], so the two populations never meet in practice.
pub const EMULATED_STUB_BASE: u32 = 0x8800_0000;

/// First address handed out to unemulated functions that have no real address.
pub const UNEMULATED_STUB_TOP: u32 = 0xFFFF_FFFF;

/// Values of `lpProcName` below this are ordinals rather than string pointers.
pub const ORDINAL_LIMIT: u32 = 0x1_0000;

/// Bit set in an import lookup entry when the import is by ordinal.
pub const IMPORT_BY_ORDINAL: u32 = 0x8000_0000;

/// Size of one `IMAGE_IMPORT_DESCRIPTOR` record in bytes.
pub const IMPORT_DESCRIPTOR_SIZE: u32 = 20;

/// Size of the hint that precedes the name in an `IMAGE_IMPORT_BY_NAME` record.
pub const IMPORT_HINT_SIZE: u32 = 2;

/// Alignment of every heap block address.
pub const HEAP_ALIGN: u32 = 8;

/// Granularity used when placing additional heaps after existing ones (64 KiB).
pub const HEAP_PLACEMENT_ALIGN: u32 = 0x1_0000;

/// Size of one backing-store page in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// Initial capacity of the buffer used to read C strings out of emulated memory.
pub const STRING_INITIAL_CAPACITY: usize = 16;

/// Growth step of the C string buffer once it is full.
pub const STRING_GROWTH: usize = 16;

/// Magic tag at the start of a saved session blob ("X86M").
pub const STATE_MAGIC: u32 = 0x4D36_3858;

/// Major version of the saved session layout.
pub const STATE_VERSION_MAJOR: u16 = 0;

/// Minor version of the saved session layout.
pub const STATE_VERSION_MINOR: u16 = 1;

/// EFLAGS value after a CPU reset (bit 1 is reserved and always set).
pub const RESET_EFLAGS: u32 = 0x2;
