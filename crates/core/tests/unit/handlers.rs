use pretty_assertions::assert_eq;
use x86emu_core::EmuError;
use x86emu_core::common::HeapError;
use x86emu_core::config::Config;
use x86emu_core::cpu::Reg;
use x86emu_core::modules::LoadPolicy;

use crate::common::harness::TestContext;

const PROCESS_HEAP: u32 = 0xA000_0000;

#[test]
fn cdecl_malloc_leaves_arguments() {
    let mut ctx = TestContext::new();
    let esp = ctx.esp();
    let block = ctx.call("malloc", &[16]).unwrap();
    assert_ne!(block, 0);
    assert_eq!(ctx.session.memory.process_heap().unwrap().block_size(block), Some(16));
    assert_eq!(ctx.esp(), esp - 4);
}

#[test]
fn free_returns_nothing() {
    let mut ctx = TestContext::new();
    let block = ctx.call("malloc", &[8]).unwrap();
    assert_eq!(ctx.call("free", &[block]).unwrap(), 0xDEAD_BEEF);
    assert_eq!(ctx.session.memory.process_heap().unwrap().live_count(), 0);
}

#[test]
fn calloc_and_realloc() {
    let mut ctx = TestContext::new();
    let block = ctx.call("calloc", &[4, 4]).unwrap();
    assert_eq!(ctx.session.memory.read_bytes(block, 16).unwrap(), vec![0; 16]);
    ctx.session.memory.write_u32(block, 0x0BAD_F00D).unwrap();

    let _pin = ctx.call("malloc", &[4]).unwrap();
    let moved = ctx.call("realloc", &[block, 64]).unwrap();
    assert_ne!(moved, block);
    assert_eq!(ctx.session.memory.read_u32(moved).unwrap(), 0x0BAD_F00D);
}

#[test]
fn calloc_overflow_is_an_error() {
    let mut ctx = TestContext::new();
    let err = ctx.call("calloc", &[0x1_0000, 0x1_0001]).unwrap_err();
    assert!(matches!(
        err,
        EmuError::Heap(HeapError::SizeOverflow { count: 0x1_0000, .. })
    ));
}

#[test]
fn stdcall_heap_calls_pop_arguments() {
    let mut ctx = TestContext::new();
    let esp = ctx.esp();

    assert_eq!(ctx.call("GetProcessHeap", &[]).unwrap(), PROCESS_HEAP);
    let block = ctx.call("HeapAlloc", &[PROCESS_HEAP, 0, 32]).unwrap();
    assert_ne!(block, 0);
    assert_eq!(ctx.esp(), esp);
    assert_eq!(ctx.session.memory.read_bytes(block, 32).unwrap(), vec![0; 32]);

    assert_eq!(ctx.call("HeapFree", &[PROCESS_HEAP, 0, block]).unwrap(), 1);
    assert_eq!(ctx.call("HeapFree", &[PROCESS_HEAP, 0, block]).unwrap(), 0);
    assert_eq!(ctx.esp(), esp);
}

#[test]
fn heap_create_and_destroy() {
    let mut ctx = TestContext::new();
    let heap = ctx.call("HeapCreate", &[0, 0x1000, 0]).unwrap();
    assert_eq!(heap, 0xA100_0000);

    let block = ctx.call("HeapAlloc", &[heap, 0, 16]).unwrap();
    assert!(block >= heap && block < heap + 0x0100_0000);
    assert_eq!(ctx.call("HeapAlloc", &[0x1234_0000, 0, 16]).unwrap(), 0);

    assert_eq!(ctx.call("HeapDestroy", &[heap]).unwrap(), 1);
    assert_eq!(ctx.call("HeapDestroy", &[heap]).unwrap(), 0);
    assert_eq!(ctx.call("HeapDestroy", &[PROCESS_HEAP]).unwrap(), 0);
}

#[test]
fn virtual_and_local_allocation() {
    let mut ctx = TestContext::new();
    let esp = ctx.esp();
    let block = ctx.call("VirtualAlloc", &[0, 0x100, 0x1000, 4]).unwrap();
    assert_ne!(block, 0);
    assert_eq!(ctx.call("VirtualFree", &[block, 0, 0x8000]).unwrap(), 1);
    assert_eq!(ctx.esp(), esp);

    let local = ctx.call("LocalAlloc", &[0, 24]).unwrap();
    assert_ne!(local, 0);
    assert_eq!(ctx.call("LocalFree", &[local]).unwrap(), 1);
    assert_eq!(ctx.call("LocalFree", &[local]).unwrap(), 0);
    assert_eq!(ctx.esp(), esp);
}

#[test]
fn virtual_free_with_truncated_arguments_changes_nothing() {
    let mut ctx = TestContext::new();
    let block = ctx.call("VirtualAlloc", &[0, 0x100, 0x1000, 4]).unwrap();
    let virtual_free = ctx.hook("VirtualFree");

    // Only lpAddress fits below the stack top; dwSize faults.
    let top = ctx.session.memory.stack().top();
    ctx.session.regs.set(Reg::Esp, top - 4);
    ctx.session.memory.write_u32(top - 4, block).unwrap();
    ctx.session.regs.set(Reg::Eax, 0xDEAD_BEEF);

    let err = ctx.session.dispatch_hook(virtual_free).unwrap_err();
    assert!(matches!(err, EmuError::Memory(_)), "{err:?}");
    assert_eq!(ctx.eax(), 0xDEAD_BEEF);
    assert_eq!(
        ctx.session.memory.process_heap().unwrap().block_size(block),
        Some(0x100)
    );
}

#[test]
fn get_proc_address_by_name() {
    let mut ctx = TestContext::new();
    let module = ctx.session.ensure_module("kernel32.dll", LoadPolicy::Fake);
    let sleep = ctx.heap_string("Sleep");
    let address = ctx.call("GetProcAddress", &[module, sleep]).unwrap();
    assert_eq!(address, 0xFFFF_FFFF);
    assert_eq!(ctx.session.last_proc_name(), "Sleep");

    let node = ctx.session.hooks.find_by_address(address).unwrap();
    assert_eq!(node.module_id, 1);

    // Same name, same address.
    assert_eq!(ctx.call("GetProcAddress", &[module, sleep]).unwrap(), address);
}

#[test]
fn get_proc_address_of_an_emulated_function() {
    let mut ctx = TestContext::new();
    let module = ctx.session.ensure_module("msvcrt.dll", LoadPolicy::Fake);
    let name = ctx.heap_string("malloc");
    // GetProcAddress itself took the first emulated stub.
    assert_eq!(ctx.call("GetProcAddress", &[module, name]).unwrap(), 0x8800_0001);
}

#[test]
fn get_proc_address_by_ordinal() {
    let mut ctx = TestContext::new();
    let module = ctx.session.ensure_module("ws2_32.dll", LoadPolicy::Fake);
    let address = ctx.call("GetProcAddress", &[module, 0x17]).unwrap();
    assert_eq!(ctx.session.last_proc_name(), "ws2_32_dll_0x0017");
    assert_eq!(
        ctx.session.hooks.find_by_name("ws2_32_dll_0x0017").unwrap().address,
        address
    );

    let _ = ctx.call("GetProcAddress", &[0x1234, 5]).unwrap();
    assert_eq!(ctx.session.last_proc_name(), "ORDINAL_00001234_0x0005");
}

#[test]
fn ordinals_of_distinct_unknown_modules_stay_distinct() {
    let mut ctx = TestContext::new();
    let a = ctx.call("GetProcAddress", &[0x1111, 5]).unwrap();
    let b = ctx.call("GetProcAddress", &[0x2222, 5]).unwrap();
    assert_ne!(a, b);
    assert_eq!(ctx.call("GetProcAddress", &[0x1111, 5]).unwrap(), a);
    assert!(ctx.session.hooks.find_by_name("ORDINAL_00002222_0x0005").is_some());
}

#[test]
fn get_module_handle_policies() {
    let mut config = Config::default();
    config.modules.get_module_handle = LoadPolicy::Never;
    config.modules.load_library = LoadPolicy::Fake;
    let mut ctx = TestContext::with_config(config);

    assert_eq!(ctx.call("GetModuleHandleA", &[0]).unwrap(), ctx.session.image_base());
    let name = ctx.heap_string("user32.dll");
    assert_eq!(ctx.call("GetModuleHandleA", &[name]).unwrap(), 0);

    let handle = ctx.call("LoadLibraryA", &[name]).unwrap();
    assert_eq!(handle, 0x8000_0001);
    // Now registered, so the lookup succeeds despite the policy.
    assert_eq!(ctx.call("GetModuleHandleA", &[name]).unwrap(), handle);
}

#[test]
fn load_library_of_empty_name() {
    let mut ctx = TestContext::new();
    let empty = ctx.heap_string("");
    assert_eq!(ctx.call("LoadLibraryA", &[empty]).unwrap(), 0);
    assert_eq!(ctx.call("LoadLibrary", &[0]).unwrap(), 0);
    assert!(ctx.session.modules.is_empty());
}

#[test]
fn unemulated_call_changes_nothing() {
    let mut ctx = TestContext::new();
    let esp = ctx.esp();
    assert_eq!(ctx.call("CreateFileA", &[1, 2]).unwrap(), 0xDEAD_BEEF);
    assert_eq!(ctx.esp(), esp - 8);
    assert_eq!(ctx.session.hooks.find_by_name("CreateFileA").unwrap().calls, 1);
}

#[test]
fn dispatch_of_unhooked_address() {
    let mut ctx = TestContext::new();
    assert!(!ctx.session.dispatch_hook(0x0040_1000).unwrap());
}
