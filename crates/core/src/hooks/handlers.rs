//! Emulated library functions.
//!
//! Handlers run after the program has pushed its arguments but without a return address on
//! the stack, so the first argument is at `[esp]`. Win32 functions are stdcall and pop their
//! arguments; the C allocator functions are cdecl and read them in place. The result is
//! written to EAX (except for `free`, which returns nothing). Every block handed out by
//! `HeapAlloc`, `VirtualAlloc`, `LocalAlloc`, `malloc` and `calloc` is traced to its call
//! site.

use tracing::{info, warn};

use super::dispatch::HookEntry;
use crate::Session;
use crate::common::Result;
use crate::common::constants::ORDINAL_LIMIT;
use crate::cpu::Reg;
use crate::modules::Symbol;

/// Every function with an emulation.
pub const HOOK_TABLE: &[HookEntry] = &[
    HookEntry { name: "VirtualAlloc", handler: virtual_alloc },
    HookEntry { name: "VirtualFree", handler: virtual_free },
    HookEntry { name: "LocalAlloc", handler: local_alloc },
    HookEntry { name: "LocalFree", handler: local_free },
    HookEntry { name: "GetProcAddress", handler: get_proc_address },
    HookEntry { name: "GetModuleHandle", handler: get_module_handle },
    HookEntry { name: "GetModuleHandleA", handler: get_module_handle },
    HookEntry { name: "LoadLibrary", handler: load_library },
    HookEntry { name: "LoadLibraryA", handler: load_library },
    HookEntry { name: "HeapCreate", handler: heap_create },
    HookEntry { name: "HeapDestroy", handler: heap_destroy },
    HookEntry { name: "HeapAlloc", handler: heap_alloc },
    HookEntry { name: "HeapFree", handler: heap_free },
    HookEntry { name: "GetProcessHeap", handler: get_process_heap },
    HookEntry { name: "malloc", handler: malloc },
    HookEntry { name: "calloc", handler: calloc },
    HookEntry { name: "realloc", handler: realloc },
    HookEntry { name: "free", handler: free },
];

#[inline]
fn set_eax(s: &mut Session, val: u32) {
    s.regs.set(Reg::Eax, val);
}

/// Handler for every hooked function without an emulation. Leaves all state untouched.
pub fn unemulated(s: &mut Session, addr: u32) -> Result<()> {
    let name = s
        .hooks
        .find_by_address(addr)
        .map_or("<unknown>", |n| n.name.as_str());
    warn!(addr, "{name} called without an emulation. Check your stack layout!");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Win32 heaps
// ═══════════════════════════════════════════════════════════

/// `HANDLE HeapCreate(DWORD flOptions, SIZE_T dwInitialSize, SIZE_T dwMaximumSize)`
fn heap_create(s: &mut Session, _addr: u32) -> Result<()> {
    let _options = s.pop_u32()?;
    let _initial = s.pop_u32()?;
    let mut max = s.pop_u32()?;
    // Growable heaps are not modelled.
    if max == 0 {
        max = s.config().memory.heap_create_size;
    }
    let heap = s.memory.add_heap(max);
    set_eax(s, heap);
    Ok(())
}

/// `BOOL HeapDestroy(HANDLE hHeap)`
fn heap_destroy(s: &mut Session, _addr: u32) -> Result<()> {
    let heap = s.pop_u32()?;
    let ok = s.memory.destroy_heap(heap);
    set_eax(s, ok as u32);
    Ok(())
}

/// `HANDLE GetProcessHeap(void)`
fn get_process_heap(s: &mut Session, _addr: u32) -> Result<()> {
    let heap = s.memory.process_heap_id().unwrap_or(0);
    set_eax(s, heap);
    Ok(())
}

/// `LPVOID HeapAlloc(HANDLE hHeap, DWORD dwFlags, SIZE_T dwBytes)`; blocks are zeroed.
fn heap_alloc(s: &mut Session, _addr: u32) -> Result<()> {
    let heap = s.pop_u32()?;
    let _flags = s.pop_u32()?;
    let bytes = s.pop_u32()?;
    let block = match s.memory.find_heap(heap) {
        Some(h) => h.calloc(bytes, 1)?,
        None => 0,
    };
    let _ = s.trace_allocation(block, bytes);
    set_eax(s, block);
    Ok(())
}

/// `BOOL HeapFree(HANDLE hHeap, DWORD dwFlags, LPVOID lpMem)`
fn heap_free(s: &mut Session, _addr: u32) -> Result<()> {
    let heap = s.pop_u32()?;
    let _flags = s.pop_u32()?;
    let mem = s.pop_u32()?;
    let ok = s.memory.find_heap(heap).is_some_and(|h| h.free(mem));
    set_eax(s, ok as u32);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Virtual and local allocation (process heap)
// ═══════════════════════════════════════════════════════════

/// `LPVOID VirtualAlloc(LPVOID lpAddress, SIZE_T dwSize, DWORD flAllocationType, DWORD flProtect)`
fn virtual_alloc(s: &mut Session, _addr: u32) -> Result<()> {
    let _address = s.pop_u32()?;
    let size = s.pop_u32()?;
    let _kind = s.pop_u32()?;
    let _protect = s.pop_u32()?;
    let block = match s.memory.process_heap_mut() {
        Some(h) => h.calloc(size, 1)?,
        None => 0,
    };
    let _ = s.trace_allocation(block, size);
    set_eax(s, block);
    Ok(())
}

/// `BOOL VirtualFree(LPVOID lpAddress, SIZE_T dwSize, DWORD dwFreeType)`
fn virtual_free(s: &mut Session, _addr: u32) -> Result<()> {
    let address = s.pop_u32()?;
    let _size = s.pop_u32()?;
    let _kind = s.pop_u32()?;
    let ok = s.memory.process_heap_mut().is_some_and(|h| h.free(address));
    set_eax(s, ok as u32);
    Ok(())
}

/// `HLOCAL LocalAlloc(UINT uFlags, SIZE_T uBytes)`
fn local_alloc(s: &mut Session, _addr: u32) -> Result<()> {
    let _flags = s.pop_u32()?;
    let size = s.pop_u32()?;
    let block = s.memory.process_heap_mut().map_or(0, |h| h.malloc(size));
    let _ = s.trace_allocation(block, size);
    set_eax(s, block);
    Ok(())
}

/// `HLOCAL LocalFree(HLOCAL hMem)`
fn local_free(s: &mut Session, _addr: u32) -> Result<()> {
    let mem = s.pop_u32()?;
    let ok = s.memory.process_heap_mut().is_some_and(|h| h.free(mem));
    set_eax(s, ok as u32);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// C allocator (cdecl, process heap)
// ═══════════════════════════════════════════════════════════

/// `void *malloc(size_t size)`
fn malloc(s: &mut Session, _addr: u32) -> Result<()> {
    let size = s.stack_arg(0)?;
    let block = s.memory.process_heap_mut().map_or(0, |h| h.malloc(size));
    let _ = s.trace_allocation(block, size);
    set_eax(s, block);
    Ok(())
}

/// `void *calloc(size_t num, size_t size)`
fn calloc(s: &mut Session, _addr: u32) -> Result<()> {
    let num = s.stack_arg(0)?;
    let size = s.stack_arg(1)?;
    let block = match s.memory.process_heap_mut() {
        Some(h) => h.calloc(num, size)?,
        None => 0,
    };
    // calloc has already rejected an overflowing product.
    let _ = s.trace_allocation(block, num.saturating_mul(size));
    set_eax(s, block);
    Ok(())
}

/// `void *realloc(void *ptr, size_t size)`
fn realloc(s: &mut Session, _addr: u32) -> Result<()> {
    let ptr = s.stack_arg(0)?;
    let size = s.stack_arg(1)?;
    let block = s.memory.process_heap_mut().map_or(0, |h| h.realloc(ptr, size));
    set_eax(s, block);
    Ok(())
}

/// `void free(void *ptr)`
fn free(s: &mut Session, _addr: u32) -> Result<()> {
    let ptr = s.stack_arg(0)?;
    if let Some(h) = s.memory.process_heap_mut() {
        let _ = h.free(ptr);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════

/// `FARPROC GetProcAddress(HMODULE hModule, LPCSTR lpProcName)`
fn get_proc_address(s: &mut Session, _addr: u32) -> Result<()> {
    let module = s.pop_u32()?;
    let proc_name = s.pop_u32()?;
    let address = if proc_name < ORDINAL_LIMIT {
        s.resolve_proc(module, Symbol::Ordinal(proc_name as u16))
    } else {
        let name = s.memory.read_string(proc_name)?;
        s.resolve_proc(module, Symbol::Name(&name))
    };
    info!(name = %s.last_proc_name(), address, "GetProcAddress");
    set_eax(s, address);
    Ok(())
}

/// `HMODULE GetModuleHandleA(LPCSTR lpModuleName)`
fn get_module_handle(s: &mut Session, _addr: u32) -> Result<()> {
    let name_ptr = s.pop_u32()?;
    let handle = if name_ptr == 0 {
        s.image_base()
    } else {
        let name = s.memory.read_string(name_ptr)?;
        let policy = s.config().modules.get_module_handle;
        s.ensure_module(&name, policy)
    };
    info!(handle, "GetModuleHandle");
    set_eax(s, handle);
    Ok(())
}

/// `HMODULE LoadLibraryA(LPCSTR lpLibFileName)`
fn load_library(s: &mut Session, _addr: u32) -> Result<()> {
    let name_ptr = s.pop_u32()?;
    let name = s.memory.read_string(name_ptr)?;
    let handle = if name.is_empty() {
        0
    } else {
        let policy = s.config().modules.load_library;
        s.ensure_module(&name, policy)
    };
    info!(name = %name, handle, "LoadLibrary");
    set_eax(s, handle);
    Ok(())
}
