//! EFLAGS bits and condition evaluation.
//!
//! The core never computes flags; it only answers flag-dependent questions
//! (`below`, `greater`, `parity even`, ...) for the execute engine and the UI.

/// Carry flag.
pub const CF: u32 = 0x1;
/// Parity flag.
pub const PF: u32 = 0x4;
/// Auxiliary carry flag.
pub const AF: u32 = 0x10;
/// Zero flag.
pub const ZF: u32 = 0x40;
/// Sign flag.
pub const SF: u32 = 0x80;
/// Trap flag.
pub const TF: u32 = 0x100;
/// Interrupt enable flag.
pub const IF: u32 = 0x200;
/// Direction flag.
pub const DF: u32 = 0x400;
/// Overflow flag.
pub const OF: u32 = 0x800;

/// The sixteen x86 condition codes, in `Jcc`/`SETcc` encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Overflow.
    O,
    /// Not overflow.
    No,
    /// Below / carry / not above-or-equal.
    B,
    /// Not below / no carry / above-or-equal.
    Nb,
    /// Equal / zero.
    E,
    /// Not equal / not zero.
    Ne,
    /// Below or equal / not above.
    Be,
    /// Above / not below-or-equal.
    A,
    /// Sign.
    S,
    /// Not sign.
    Ns,
    /// Parity even.
    P,
    /// Parity odd.
    Np,
    /// Less / not greater-or-equal.
    L,
    /// Greater or equal / not less.
    Ge,
    /// Less or equal / not greater.
    Le,
    /// Greater / not less-or-equal.
    G,
}

impl Condition {
    /// Decodes the low nibble of a `Jcc`/`SETcc`/`CMOVcc` opcode.
    pub const fn from_code(code: u8) -> Self {
        match code & 0xF {
            0x0 => Self::O,
            0x1 => Self::No,
            0x2 => Self::B,
            0x3 => Self::Nb,
            0x4 => Self::E,
            0x5 => Self::Ne,
            0x6 => Self::Be,
            0x7 => Self::A,
            0x8 => Self::S,
            0x9 => Self::Ns,
            0xA => Self::P,
            0xB => Self::Np,
            0xC => Self::L,
            0xD => Self::Ge,
            0xE => Self::Le,
            _ => Self::G,
        }
    }

    /// Evaluates the condition against an EFLAGS value.
    pub const fn holds(self, eflags: u32) -> bool {
        let cf = eflags & CF != 0;
        let zf = eflags & ZF != 0;
        let sf = eflags & SF != 0;
        let of = eflags & OF != 0;
        let pf = eflags & PF != 0;
        match self {
            Self::O => of,
            Self::No => !of,
            Self::B => cf,
            Self::Nb => !cf,
            Self::E => zf,
            Self::Ne => !zf,
            Self::Be => cf || zf,
            Self::A => !cf && !zf,
            Self::S => sf,
            Self::Ns => !sf,
            Self::P => pf,
            Self::Np => !pf,
            Self::L => sf != of,
            Self::Ge => sf == of,
            Self::Le => zf || sf != of,
            Self::G => !zf && sf == of,
        }
    }
}
