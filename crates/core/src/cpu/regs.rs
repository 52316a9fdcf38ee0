//! IA-32 Register File.
//!
//! This module implements the architectural register state of the emulated CPU.
//! It provides:
//! 1. **Storage:** General, segment (with cached bases), control and debug registers, EIP and EFLAGS.
//! 2. **Flag Queries:** Single-bit tests and condition-code evaluation.
//! 3. **Persistence:** A fixed little-endian layout for saved sessions.
//! 4. **Display:** A register dump for the CLI and diagnostics.

use std::fmt;

use super::flags::Condition;
use crate::common::constants::RESET_EFLAGS;
use crate::common::{ByteReader, StateError};

/// General-purpose registers in ModRM encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg {
    /// Accumulator; holds hook return values.
    Eax = 0,
    /// Counter.
    Ecx = 1,
    /// Data.
    Edx = 2,
    /// Base.
    Ebx = 3,
    /// Stack pointer.
    Esp = 4,
    /// Frame pointer.
    Ebp = 5,
    /// Source index.
    Esi = 6,
    /// Destination index.
    Edi = 7,
}

/// Segment registers in encoding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seg {
    /// Code segment.
    Cs = 0,
    /// Stack segment.
    Ss = 1,
    /// Data segment.
    Ds = 2,
    /// Extra segment.
    Es = 3,
    /// FS; on Win32 its base points at the TEB.
    Fs = 4,
    /// GS.
    Gs = 5,
}

const GENERAL_NAMES: [&str; 8] = ["EAX", "ECX", "EDX", "EBX", "ESP", "EBP", "ESI", "EDI"];

/// Number of bytes [`RegisterFile::encode`] produces.
pub const ENCODED_LEN: usize = 8 * 4 + 4 + 4 + 4 + 6 * 2 + 6 * 4 + 5 * 4 + 8 * 4;

/// Architectural register state of the emulated CPU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    /// EAX..EDI, indexed by [`Reg`].
    pub general: [u32; 8],
    /// Segment selectors, indexed by [`Seg`].
    pub segment: [u16; 6],
    /// Cached linear base of each segment.
    pub segment_base: [u32; 6],
    /// CR0..CR4.
    pub control: [u32; 5],
    /// DR0..DR7.
    pub debug: [u32; 8],
    /// Instruction pointer.
    pub eip: u32,
    /// EIP of the instruction currently executing; used when raising faults.
    pub initial_eip: u32,
    /// Flags word. Only the execute engine or an explicit user edit changes it.
    pub eflags: u32,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates a register file in the reset state.
    pub const fn new() -> Self {
        Self {
            general: [0; 8],
            segment: [0; 6],
            segment_base: [0; 6],
            control: [0; 5],
            debug: [0; 8],
            eip: 0,
            initial_eip: 0,
            eflags: RESET_EFLAGS,
        }
    }

    /// Returns every register to the reset state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Reads a general-purpose register.
    #[inline]
    pub const fn get(&self, reg: Reg) -> u32 {
        self.general[reg as usize]
    }

    /// Writes a general-purpose register.
    #[inline]
    pub const fn set(&mut self, reg: Reg, val: u32) {
        self.general[reg as usize] = val;
    }

    /// Shorthand for `get(Reg::Eax)`.
    #[inline]
    pub const fn eax(&self) -> u32 {
        self.get(Reg::Eax)
    }

    /// Shorthand for `get(Reg::Esp)`.
    #[inline]
    pub const fn esp(&self) -> u32 {
        self.get(Reg::Esp)
    }

    /// Reads a segment selector together with its cached base.
    pub const fn segment(&self, seg: Seg) -> (u16, u32) {
        (self.segment[seg as usize], self.segment_base[seg as usize])
    }

    /// Loads a segment selector and its cached base.
    pub const fn set_segment(&mut self, seg: Seg, selector: u16, base: u32) {
        self.segment[seg as usize] = selector;
        self.segment_base[seg as usize] = base;
    }

    /// Loads the selectors a Win32 user-mode thread starts with.
    pub const fn load_win32_segments(&mut self) {
        self.segment[Seg::Cs as usize] = 0x1B;
        self.segment[Seg::Ss as usize] = 0x23;
        self.segment[Seg::Ds as usize] = 0x23;
        self.segment[Seg::Es as usize] = 0x23;
        self.segment[Seg::Fs as usize] = 0x38;
    }

    /// Tests a single EFLAGS bit (see [`super::flags`]).
    #[inline]
    pub const fn flag(&self, bit: u32) -> bool {
        self.eflags & bit != 0
    }

    /// Evaluates a condition code against the current flags.
    #[inline]
    pub const fn test(&self, cond: Condition) -> bool {
        cond.holds(self.eflags)
    }

    /// Appends the register state to `out` in the saved-session layout.
    pub fn encode(&self, out: &mut Vec<u8>) {
        for v in self.general {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.eip.to_le_bytes());
        out.extend_from_slice(&self.initial_eip.to_le_bytes());
        out.extend_from_slice(&self.eflags.to_le_bytes());
        for v in self.segment {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in self
            .segment_base
            .iter()
            .chain(&self.control)
            .chain(&self.debug)
        {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Reads a register state written by [`RegisterFile::encode`].
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, StateError> {
        let mut regs = Self::new();
        for v in &mut regs.general {
            *v = reader.u32()?;
        }
        regs.eip = reader.u32()?;
        regs.initial_eip = reader.u32()?;
        regs.eflags = reader.u32()?;
        for v in &mut regs.segment {
            *v = reader.u16()?;
        }
        for v in regs
            .segment_base
            .iter_mut()
            .chain(regs.control.iter_mut())
            .chain(regs.debug.iter_mut())
        {
            *v = reader.u32()?;
        }
        Ok(regs)
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in (0..8).step_by(2) {
            writeln!(
                f,
                "{}=0x{:08X}  {}=0x{:08X}",
                GENERAL_NAMES[pair],
                self.general[pair],
                GENERAL_NAMES[pair + 1],
                self.general[pair + 1]
            )?;
        }
        write!(f, "EIP=0x{:08X}  EFLAGS=0x{:08X}", self.eip, self.eflags)
    }
}
