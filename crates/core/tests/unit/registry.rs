use pretty_assertions::assert_eq;
use x86emu_core::common::{ByteReader, StateError};
use x86emu_core::modules::{
    ExportTable, FixedPrompt, ImageHost, LoadDecision, LoadPolicy, ModuleHandle, ModuleImage,
    ModuleRegistry, NoHost, Symbol,
};

use crate::common::mocks::{MockHost, MockPrompt};

const DLL_BASE: u32 = 0x1000_0000;

fn alpha_beta() -> ModuleImage {
    ModuleImage {
        size_of_image: 0x3000,
        exports: ExportTable {
            ordinal_base: 1,
            functions: vec![0x1100, 0x1200, 0],
            names: vec!["Alpha".to_owned(), "Beta".to_owned()],
            name_ordinals: vec![0, 1],
        },
    }
}

fn faking() -> ModuleRegistry {
    ModuleRegistry::new(Box::new(NoHost), Box::new(FixedPrompt(LoadDecision::Fake)))
}

fn with_image_host(resident: bool) -> ModuleRegistry {
    let mut host = ImageHost::new();
    host.add_module("helper.dll", DLL_BASE, alpha_beta(), resident);
    ModuleRegistry::new(Box::new(host), Box::new(FixedPrompt(LoadDecision::Skip)))
}

fn saved(records: &[(u32, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as i32).to_le_bytes());
    for (id, name) in records {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

#[test]
fn faked_modules_get_synthetic_handles() {
    let mut reg = faking();
    let first = reg.add_module("USER32.dll", 0, LoadPolicy::Fake).unwrap().clone();
    assert_eq!(first.handle, ModuleHandle::Synthetic(1));
    assert_eq!(first.base(), 0x8000_0001);
    assert_eq!(first.id, 1);

    let second = reg.add_module("gdi32.dll", 0, LoadPolicy::Fake).unwrap();
    assert_eq!(second.base(), 0x8000_0002);
    assert_eq!(reg.next_id(), 3);
}

#[test]
fn add_module_is_idempotent_ignoring_case() {
    let mut reg = faking();
    let a = reg.add_module("KERNEL32.dll", 0, LoadPolicy::Fake).unwrap().base();
    let b = reg.add_module("kernel32.DLL", 0, LoadPolicy::Fake).unwrap().base();
    assert_eq!(a, b);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.find_by_name("Kernel32.Dll").unwrap().base(), a);
}

#[test]
fn never_policy_refuses() {
    let mut reg = faking();
    assert!(reg.add_module("ws2_32.dll", 0, LoadPolicy::Never).is_none());
    assert!(reg.is_empty());
    assert_eq!(reg.next_id(), 1);
}

#[test]
fn resident_module_is_real_regardless_of_policy() {
    let mut reg = with_image_host(true);
    let m = reg.add_module("HELPER", 0, LoadPolicy::Never).unwrap();
    assert_eq!(m.handle, ModuleHandle::Real(DLL_BASE));
    assert_eq!(m.range_end, DLL_BASE + 0x3000);
    assert_eq!(m.name, "HELPER");
}

#[test]
fn load_policy_asks_the_host() {
    let mut reg = with_image_host(false);
    let base = reg.add_module("helper.dll", 0, LoadPolicy::Load).unwrap().base();
    assert_eq!(base, DLL_BASE);
    assert!(reg.add_module("missing.dll", 0, LoadPolicy::Load).is_none());
}

#[test]
fn ask_consults_the_prompt_once() {
    let mut prompt = MockPrompt::new();
    let _ = prompt
        .expect_decide()
        .times(1)
        .returning(|_| LoadDecision::Fake);
    let mut reg = ModuleRegistry::new(Box::new(NoHost), Box::new(prompt));

    let handle = reg.add_module("msvcrt.dll", 0, LoadPolicy::Ask).unwrap().handle;
    assert!(handle.is_synthetic());
    // Already registered: no second question.
    assert!(reg.add_module("MSVCRT.DLL", 0, LoadPolicy::Ask).is_some());
}

#[test]
fn prompt_skip_leaves_module_unregistered() {
    let mut prompt = MockPrompt::new();
    let _ = prompt
        .expect_decide()
        .times(1)
        .returning(|_| LoadDecision::Skip);
    let mut reg = ModuleRegistry::new(Box::new(NoHost), Box::new(prompt));
    assert!(reg.add_module("shell32.dll", 0, LoadPolicy::Ask).is_none());
    assert!(reg.find_by_name("shell32.dll").is_none());
}

#[test]
fn restoring_under_ask_does_not_prompt() {
    let mut prompt = MockPrompt::new();
    let _ = prompt.expect_decide().times(0);
    let mut host = MockHost::new();
    let _ = host.expect_find_resident().returning(|_| None);
    let _ = host.expect_load_library().times(1).returning(|_| None);
    let _ = host.expect_inspect().returning(|_| None);
    let mut reg = ModuleRegistry::new(Box::new(host), Box::new(prompt));

    let buf = saved(&[(4, "gone.dll")]);
    reg.load(&mut ByteReader::new(&buf), LoadPolicy::Ask).unwrap();
    let m = reg.find_by_name("gone.dll").unwrap();
    assert_eq!(m.handle, ModuleHandle::Synthetic(4));
    assert_eq!(reg.next_id(), 5);
}

#[test]
fn mock_host_real_module() {
    let mut host = MockHost::new();
    let _ = host.expect_find_resident().returning(|_| None);
    let _ = host
        .expect_load_library()
        .times(1)
        .returning(|_| Some(DLL_BASE));
    let _ = host
        .expect_inspect()
        .returning(|_| Some(alpha_beta()));
    let mut reg = ModuleRegistry::new(Box::new(host), Box::new(FixedPrompt(LoadDecision::Load)));

    let m = reg.add_module("helper.dll", 0, LoadPolicy::Ask).unwrap().clone();
    assert_eq!(m.handle, ModuleHandle::Real(DLL_BASE));
    assert_eq!(m.export_address(Symbol::Name("Beta")), Some(DLL_BASE + 0x1200));
    assert_eq!(m.export_address(Symbol::Ordinal(1)), Some(DLL_BASE + 0x1100));
    assert_eq!(m.export_address(Symbol::Ordinal(3)), None, "zero RVA slot");
    assert_eq!(m.export_address(Symbol::Name("Gamma")), None);
}

#[test]
fn aliased_names_share_a_module() {
    let mut host = ImageHost::new();
    host.add_module("helper.dll", DLL_BASE, alpha_beta(), true);
    host.add_module("helper_alias.dll", DLL_BASE, alpha_beta(), true);
    let mut reg = ModuleRegistry::new(Box::new(host), Box::new(FixedPrompt(LoadDecision::Skip)));

    let _ = reg.add_module("helper.dll", 0, LoadPolicy::Never);
    let alias = reg.add_module("helper_alias.dll", 0, LoadPolicy::Never).unwrap();
    assert_eq!(alias.name, "helper.dll");
    assert_eq!(reg.len(), 1);
}

#[test]
fn lookup_by_handle_and_id() {
    let mut reg = faking();
    let _ = reg.add_module("a.dll", 0, LoadPolicy::Fake);
    let _ = reg.add_module("b.dll", 0, LoadPolicy::Fake);
    assert_eq!(reg.find_by_handle(0x8000_0002).unwrap().name, "b.dll");
    assert_eq!(reg.find_by_handle(2).unwrap().name, "b.dll");
    assert!(reg.find_by_handle(3).is_none());
}

#[test]
fn module_from_address_and_reverse_lookup() {
    let mut reg = with_image_host(true);
    let _ = reg.add_module("helper.dll", 0, LoadPolicy::Never);
    let _ = reg.add_module("fake.dll", 0, LoadPolicy::Fake);

    assert_eq!(reg.module_from_address(DLL_BASE + 0x1234).unwrap().name, "helper.dll");
    assert!(reg.module_from_address(DLL_BASE + 0x3000).is_none());
    assert!(reg.module_from_address(DLL_BASE - 1).is_none());
    let fake = reg.find_by_name("fake.dll").unwrap().base();
    assert_eq!(reg.module_from_address(fake).unwrap().name, "fake.dll");
    assert!(reg.module_from_address(fake + 1).is_none());

    assert_eq!(reg.reverse_lookup_export(DLL_BASE + 0x1100), Some("Alpha"));
    assert_eq!(reg.reverse_lookup_export(DLL_BASE + 0x1104), None);
    assert_eq!(reg.reverse_lookup_export(fake), None);
    assert_eq!(
        reg.export_address(DLL_BASE, Symbol::Name("Alpha")),
        Some(DLL_BASE + 0x1100)
    );
    assert_eq!(reg.export_address(fake, Symbol::Name("Alpha")), None);
}

#[test]
fn save_load_round_trip() {
    let mut reg = with_image_host(true);
    let _ = reg.add_module("helper.dll", 0, LoadPolicy::Never);
    let _ = reg.add_module("fake.dll", 0, LoadPolicy::Fake);
    let mut buf = Vec::new();
    reg.save(&mut buf);
    assert_eq!(buf, saved(&[(1, "helper.dll"), (0x8000_0002, "fake.dll")]));

    let mut restored = with_image_host(true);
    restored
        .load(&mut ByteReader::new(&buf), LoadPolicy::Fake)
        .unwrap();
    let before: Vec<_> = reg.iter().cloned().collect();
    let after: Vec<_> = restored.iter().cloned().collect();
    assert_eq!(after, before);
    assert_eq!(restored.next_id(), 3);
}

#[test]
fn unavailable_real_module_is_refaked_on_restore() {
    let buf = saved(&[(7, "helper.dll")]);
    for policy in [LoadPolicy::Never, LoadPolicy::Load, LoadPolicy::Fake] {
        let mut reg = faking();
        reg.load(&mut ByteReader::new(&buf), policy).unwrap();
        let m = reg.find_by_name("helper.dll").unwrap();
        assert_eq!(m.handle, ModuleHandle::Synthetic(7), "{policy:?}");
        assert_eq!(m.persisted_id(), 0x8000_0007);
    }
}

#[test]
fn malformed_list_leaves_registry_untouched() {
    let mut reg = faking();
    let _ = reg.add_module("keep.dll", 0, LoadPolicy::Fake);

    let mut buf = saved(&[(1, "a.dll"), (2, "b.dll")]);
    buf.truncate(buf.len() - 3);
    assert!(matches!(
        reg.load(&mut ByteReader::new(&buf), LoadPolicy::Fake),
        Err(StateError::Truncated { .. })
    ));

    let negative = (-1i32).to_le_bytes();
    assert_eq!(
        reg.load(&mut ByteReader::new(&negative), LoadPolicy::Fake),
        Err(StateError::BadLength(-1))
    );
    assert_eq!(reg.len(), 1);
    assert!(reg.find_by_name("keep.dll").is_some());
}

#[test]
fn clear_restarts_ids() {
    let mut reg = faking();
    let _ = reg.add_module("a.dll", 0, LoadPolicy::Fake);
    reg.clear();
    assert!(reg.is_empty());
    assert_eq!(reg.add_module("b.dll", 0, LoadPolicy::Fake).unwrap().id, 1);
}
