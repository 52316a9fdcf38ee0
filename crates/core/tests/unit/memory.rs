use pretty_assertions::assert_eq;
use x86emu_core::common::{AccessType, MemoryFault, RegionKind};
use x86emu_core::memory::MemoryManager;

const STACK_TOP: u32 = 0x0130_0000;
const HEAP: u32 = 0xA000_0000;

fn manager() -> MemoryManager {
    let mut mem = MemoryManager::new(STACK_TOP, 0x0010_0000);
    assert!(mem.init_heap(HEAP, 0x0001_0000));
    mem
}

#[test]
fn region_routing() {
    let mut mem = manager();
    assert!(mem.map_image_region(0x0040_0000, 0x2000));
    assert_eq!(mem.region_of(STACK_TOP - 4), Some(RegionKind::Stack));
    assert_eq!(mem.region_of(STACK_TOP), None);
    assert_eq!(mem.region_of(HEAP + 0x10), Some(RegionKind::Heap(HEAP)));
    assert_eq!(mem.region_of(0x0040_1FFF), Some(RegionKind::Image));
    assert_eq!(mem.region_of(0x0040_2000), None);
}

#[test]
fn little_endian_access() {
    let mut mem = manager();
    let addr = STACK_TOP - 8;
    mem.write_u32(addr, 0x1122_3344).unwrap();
    assert_eq!(mem.read_u8(addr).unwrap(), 0x44);
    assert_eq!(mem.read_u16(addr + 2).unwrap(), 0x1122);
    mem.write_u16(addr, 0xBEEF).unwrap();
    assert_eq!(mem.read_u32(addr).unwrap(), 0x1122_BEEF);
}

#[test]
fn unmapped_access_faults() {
    let mut mem = manager();
    assert_eq!(
        mem.read_u32(0x5000_0000),
        Err(MemoryFault {
            addr: 0x5000_0000,
            access: AccessType::Read
        })
    );
    assert_eq!(
        mem.write_u8(0x5000_0000, 1),
        Err(MemoryFault {
            addr: 0x5000_0000,
            access: AccessType::Write
        })
    );
}

#[test]
fn straddling_write_changes_nothing() {
    let mut mem = manager();
    // The last two bytes of the stack, then unmapped space.
    let err = mem.write_u32(STACK_TOP - 2, 0xFFFF_FFFF).unwrap_err();
    assert_eq!(err.addr, STACK_TOP);
    assert_eq!(mem.read_u16(STACK_TOP - 2).unwrap(), 0);
}

#[test]
fn read_string_variants() {
    let mut mem = manager();
    assert_eq!(mem.read_string(0).unwrap(), "");

    mem.write_bytes(HEAP, b"kernel32.dll\0").unwrap();
    assert_eq!(mem.read_string(HEAP).unwrap(), "kernel32.dll");

    let long = "A".repeat(100);
    mem.write_bytes(HEAP + 0x100, long.as_bytes()).unwrap();
    mem.write_u8(HEAP + 0x100 + 100, 0).unwrap();
    assert_eq!(mem.read_string(HEAP + 0x100).unwrap(), long);
}

#[test]
fn unterminated_string_faults_at_region_end() {
    let mut mem = manager();
    let end = STACK_TOP;
    mem.write_bytes(end - 3, b"abc").unwrap();
    assert_eq!(mem.read_string(end - 3).unwrap_err().addr, end);
}

#[test]
fn dump_range_is_inclusive() {
    let mut mem = manager();
    mem.write_bytes(HEAP, &[1, 2, 3, 4]).unwrap();
    assert_eq!(mem.dump_range(HEAP, HEAP + 3).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(mem.dump_range(HEAP + 1, HEAP + 1).unwrap(), vec![2]);
    assert!(mem.dump_range(HEAP + 3, HEAP).unwrap().is_empty());
}

#[test]
fn dump_and_load_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("range.bin");
    let mut mem = manager();
    mem.write_bytes(HEAP, b"payload").unwrap();

    assert_eq!(mem.dump_range_to_file(&path, HEAP, HEAP + 6).unwrap(), 7);
    assert_eq!(std::fs::read(&path).unwrap(), b"payload".to_vec());

    assert_eq!(mem.load_file(&path, STACK_TOP - 0x100).unwrap(), 7);
    assert_eq!(mem.read_string(STACK_TOP - 0x100).unwrap(), "payload");
}

#[test]
fn load_file_into_unmapped_memory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    std::fs::write(&path, [0u8; 16]).unwrap();
    let mut mem = manager();
    assert!(mem.load_file(&path, 0x5000_0000).is_err());
    assert!(mem.load_file(dir.path().join("missing.bin"), HEAP).is_err());
}

#[test]
fn additional_heaps() {
    let mut mem = manager();
    let first = mem.add_heap(0x1000);
    assert_eq!(first, 0xA001_0000);
    let second = mem.add_heap(0x1000);
    assert_eq!(second, 0xA002_0000);
    assert_eq!(mem.region_of(second + 4), Some(RegionKind::Heap(second)));

    assert!(mem.destroy_heap(first));
    assert!(!mem.destroy_heap(first));
    assert_eq!(mem.region_of(first), None);
    assert!(!mem.destroy_heap(HEAP), "the process heap stays");
    assert_eq!(mem.add_heap(0), 0);
}

#[test]
fn overlapping_regions_are_rejected() {
    let mut mem = manager();
    assert!(!mem.map_image_region(STACK_TOP - 0x10, 0x100));
    assert!(!mem.map_image_region(HEAP + 0x100, 0x100));
    assert!(mem.map_image_region(0x0040_0000, 0x1000));
    assert!(!mem.map_image_region(0x0040_0800, 0x1000));
}
