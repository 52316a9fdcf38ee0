use pretty_assertions::assert_eq;
use rstest::rstest;
use x86emu_core::common::ByteReader;
use x86emu_core::cpu::flags::{CF, OF, PF, SF, ZF};
use x86emu_core::cpu::{Condition, Reg, RegisterFile, Seg};

#[test]
fn reset_state() {
    let regs = RegisterFile::new();
    assert_eq!(regs.general, [0; 8]);
    assert_eq!(regs.eip, 0);
    assert_eq!(regs.eflags, 0x2);
}

#[test]
fn general_registers_by_name() {
    let mut regs = RegisterFile::new();
    regs.set(Reg::Eax, 0x1234_5678);
    regs.set(Reg::Esp, 0x0012_FF00);
    assert_eq!(regs.eax(), 0x1234_5678);
    assert_eq!(regs.esp(), 0x0012_FF00);
    assert_eq!(regs.general[Reg::Esp as usize], 0x0012_FF00);
}

#[test]
fn win32_segments() {
    let mut regs = RegisterFile::new();
    regs.load_win32_segments();
    assert_eq!(regs.segment(Seg::Cs).0, 0x1B);
    assert_eq!(regs.segment(Seg::Ds).0, 0x23);
    assert_eq!(regs.segment(Seg::Fs).0, 0x38);
}

#[rstest]
#[case(Condition::E, ZF, true)]
#[case(Condition::E, 0, false)]
#[case(Condition::Ne, 0, true)]
#[case(Condition::B, CF, true)]
#[case(Condition::A, CF, false)]
#[case(Condition::A, 0, true)]
#[case(Condition::Be, ZF, true)]
#[case(Condition::L, SF, true)]
#[case(Condition::L, SF | OF, false)]
#[case(Condition::Ge, SF | OF, true)]
#[case(Condition::G, 0, true)]
#[case(Condition::G, ZF, false)]
#[case(Condition::Le, ZF, true)]
#[case(Condition::P, PF, true)]
#[case(Condition::Np, PF, false)]
#[case(Condition::O, OF, true)]
fn condition_codes(#[case] cond: Condition, #[case] eflags: u32, #[case] expected: bool) {
    let mut regs = RegisterFile::new();
    regs.eflags = eflags | 0x2;
    assert_eq!(regs.test(cond), expected);
}

#[rstest]
#[case(0x74, Condition::E)]
#[case(0x75, Condition::Ne)]
#[case(0x7F, Condition::G)]
#[case(0x0F82, Condition::B)]
fn condition_from_opcode(#[case] opcode: u16, #[case] expected: Condition) {
    assert_eq!(Condition::from_code(opcode as u8), expected);
}

#[test]
fn encode_decode_preserves_state() {
    let mut regs = RegisterFile::new();
    regs.set(Reg::Ebx, 7);
    regs.eip = 0x0040_1000;
    regs.initial_eip = 0x0040_0FFC;
    regs.eflags = ZF | 0x2;
    regs.set_segment(Seg::Fs, 0x38, 0x7FFD_E000);
    regs.control[0] = 0x11;
    regs.debug[7] = 0x400;

    let mut out = Vec::new();
    regs.encode(&mut out);
    assert_eq!(out.len(), x86emu_core::cpu::regs::ENCODED_LEN);
    let decoded = RegisterFile::decode(&mut ByteReader::new(&out)).unwrap();
    assert_eq!(decoded, regs);
}

#[test]
fn display_lists_registers() {
    let mut regs = RegisterFile::new();
    regs.set(Reg::Eax, 0xCAFE);
    let text = regs.to_string();
    assert!(text.contains("EAX=0x0000CAFE"));
    assert!(text.contains("EFLAGS=0x00000002"));
}
