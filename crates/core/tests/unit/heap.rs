use proptest::prelude::*;
use x86emu_core::common::HeapError;
use x86emu_core::memory::EmuHeap;
use x86emu_core::memory::MemoryManager;

const BASE: u32 = 0x1000_0000;

fn manager() -> MemoryManager {
    let mut mem = MemoryManager::new(0x0130_0000, 0x0010_0000);
    assert!(mem.init_heap(BASE, 0x0001_0000));
    mem
}

fn heap(mem: &mut MemoryManager) -> &mut EmuHeap {
    mem.process_heap_mut().unwrap()
}

#[test]
fn malloc_is_aligned_and_nonzero() {
    let mut heap = EmuHeap::new(0, 0x1000);
    let a = heap.malloc(3);
    let b = heap.malloc(0);
    assert_ne!(a, 0);
    assert_ne!(b, 0);
    assert_eq!(a % 8, 0);
    assert_eq!(b % 8, 0);
    assert_ne!(a, b);
}

#[test]
fn exhaustion_returns_null() {
    let mut heap = EmuHeap::new(BASE, 0x100);
    assert_eq!(heap.malloc(0x200), 0);
    assert_ne!(heap.malloc(0x80), 0);
    assert_ne!(heap.malloc(0x80), 0);
    assert_eq!(heap.malloc(8), 0);
}

#[test]
fn freed_space_is_reused() {
    let mut heap = EmuHeap::new(BASE, 0x1000);
    let a = heap.malloc(64);
    let _b = heap.malloc(64);
    assert!(heap.free(a));
    assert_eq!(heap.malloc(32), a);
}

#[test]
fn free_of_unknown_block() {
    let mut heap = EmuHeap::new(BASE, 0x1000);
    let a = heap.malloc(16);
    assert!(!heap.free(a + 8));
    assert!(heap.free(a));
    assert!(!heap.free(a), "double free is reported, not honoured");
}

#[test]
fn calloc_zeroes_recycled_memory() {
    let mut mem = manager();
    let a = heap(&mut mem).malloc(32);
    mem.write_bytes(a, &[0xAA; 32]).unwrap();
    assert!(heap(&mut mem).free(a));

    let b = heap(&mut mem).calloc(4, 8).unwrap();
    assert_eq!(b, a);
    assert_eq!(mem.read_bytes(b, 32).unwrap(), vec![0; 32]);
}

#[test]
fn calloc_overflow() {
    let mut heap = EmuHeap::new(BASE, 0x1000);
    assert_eq!(
        heap.calloc(0x1_0000, 0x1_0000),
        Err(HeapError::SizeOverflow {
            count: 0x1_0000,
            size: 0x1_0000
        })
    );
}

#[test]
fn realloc_grows_in_place_when_free() {
    let mut heap = EmuHeap::new(BASE, 0x1000);
    let a = heap.malloc(16);
    assert_eq!(heap.realloc(a, 64), a);
    assert_eq!(heap.block_size(a), Some(64));
}

#[test]
fn realloc_moves_and_preserves_contents() {
    let mut mem = manager();
    let a = heap(&mut mem).malloc(8);
    let _blocker = heap(&mut mem).malloc(8);
    mem.write_bytes(a, b"ABCDEFGH").unwrap();

    let b = heap(&mut mem).realloc(a, 32);
    assert_ne!(b, 0);
    assert_ne!(b, a);
    assert_eq!(mem.read_bytes(b, 8).unwrap(), b"ABCDEFGH".to_vec());
    assert_eq!(heap(&mut mem).block_size(a), None);
}

#[test]
fn realloc_edge_cases() {
    let mut heap = EmuHeap::new(BASE, 0x1000);
    let a = heap.realloc(0, 24);
    assert_ne!(a, 0);
    assert_eq!(heap.realloc(a, 0), 0);
    assert_eq!(heap.live_count(), 0);
    assert_eq!(heap.realloc(BASE + 0x800, 8), 0);
}

#[test]
fn failed_realloc_keeps_block() {
    let mut heap = EmuHeap::new(BASE, 0x40);
    let a = heap.malloc(8);
    let _b = heap.malloc(8);
    assert_eq!(heap.realloc(a, 0x100), 0);
    assert_eq!(heap.block_size(a), Some(8));
}

#[derive(Clone, Debug)]
enum Op {
    Alloc(u32),
    Free(usize),
    Realloc(usize, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..512).prop_map(Op::Alloc),
        any::<usize>().prop_map(Op::Free),
        (any::<usize>(), 0u32..512).prop_map(|(i, n)| Op::Realloc(i, n)),
    ]
}

proptest! {
    #[test]
    fn live_blocks_never_overlap(ops in prop::collection::vec(op(), 1..64)) {
        let mut heap = EmuHeap::new(BASE, 0x4000);
        let mut live: Vec<u32> = Vec::new();
        for op in ops {
            match op {
                Op::Alloc(n) => {
                    let a = heap.malloc(n);
                    if a != 0 {
                        live.push(a);
                    }
                }
                Op::Free(i) if !live.is_empty() => {
                    let a = live.swap_remove(i % live.len());
                    prop_assert!(heap.free(a));
                }
                Op::Realloc(i, n) if !live.is_empty() => {
                    let idx = i % live.len();
                    let a = heap.realloc(live[idx], n);
                    if n == 0 {
                        let _ = live.swap_remove(idx);
                    } else if a != 0 {
                        live[idx] = a;
                    }
                }
                Op::Free(_) | Op::Realloc(..) => {}
            }

            let blocks: Vec<(u32, u32)> = heap.live_blocks().collect();
            prop_assert_eq!(blocks.len(), live.len());
            for pair in blocks.windows(2) {
                let (a, size) = pair[0];
                let (b, _) = pair[1];
                prop_assert!(u64::from(a) + u64::from(size.max(1)) <= u64::from(b));
            }
            for &(a, size) in &blocks {
                prop_assert!(a >= BASE);
                prop_assert!(u64::from(a) + u64::from(size) <= u64::from(BASE) + 0x4000);
                prop_assert_eq!(a % 8, 0);
            }
        }
    }
}

proptest! {
    #[test]
    fn realloc_preserves_common_prefix(old in 1u32..256, new in 1u32..256, pinned in any::<bool>()) {
        let mut mem = manager();
        let a = heap(&mut mem).malloc(old);
        prop_assert_ne!(a, 0);
        if pinned {
            prop_assert_ne!(heap(&mut mem).malloc(8), 0);
        }
        let pattern: Vec<u8> = (0..old).map(|i| (i as u8).wrapping_mul(31) ^ 0x5A).collect();
        mem.write_bytes(a, &pattern).unwrap();

        let b = heap(&mut mem).realloc(a, new);
        prop_assert_ne!(b, 0);
        prop_assert_eq!(heap(&mut mem).block_size(b), Some(new));
        let keep = old.min(new);
        prop_assert_eq!(mem.read_bytes(b, keep).unwrap(), pattern[..keep as usize].to_vec());
    }

    #[test]
    fn calloc_is_always_zeroed(dirty in 1u32..512, count in 0u32..64, size in 0u32..16) {
        let mut mem = manager();
        let a = heap(&mut mem).malloc(dirty);
        mem.write_bytes(a, &vec![0xFF; dirty as usize]).unwrap();
        prop_assert!(heap(&mut mem).free(a));

        let b = heap(&mut mem).calloc(count, size).unwrap();
        prop_assert_ne!(b, 0);
        let len = count * size;
        prop_assert_eq!(mem.read_bytes(b, len).unwrap(), vec![0; len as usize]);
    }
}
