//! Library Call Interception.
//!
//! This module substitutes native handlers for library functions the stepped program calls
//! but the emulator does not execute. It provides:
//! 1. **Dispatch:** The live hook table, keyed by call-target address and by function name.
//! 2. **Stub Addresses:** Synthetic addresses for functions with no real address.
//! 3. **Handlers:** Emulations of the Win32 allocation and module-loading APIs and the C
//!    allocator, plus the catch-all stub for everything else.

/// Hook table and address minting.
pub mod dispatch;

/// Emulated library functions.
pub mod handlers;

pub use dispatch::{HookDispatch, HookEntry, HookFn, HookNode};
pub use handlers::HOOK_TABLE;
