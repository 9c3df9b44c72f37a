//! Component A — the opcode engine.
//!
//! An [`Opcode`] is a template for one 32-bit serial instruction: 32
//! [`CmdBit`] entries, indexed `0..32`, each saying what that instruction
//! bit is for (a literal, a slice of an address, a slice of the input data
//! byte, or a slice of the output data byte) and which source/destination
//! bit it reflects.
//!
//! Bit-indexing convention (bit-exact with deployed wire formats — do not
//! change): index `i` lives in byte `3 - i / 8` at bit `i % 8`, where bit 0
//! of a byte is its LSB. `cmd[0]` is transmitted first, `cmd[3]` last.

use core::fmt;

/// The four-byte instruction frame transmitted to, or received from, an
/// SPI-class programmer.
pub type Frame = [u8; 4];

/// One operation kind the core recognizes. Part-level operations
/// (`PgmEnable`, `ChipErase`) live in [`Part::part_ops`](crate::part::Part::part_ops);
/// the rest are per-memory and live in [`Memory::ops`](crate::memory::Memory::ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    /// Read a byte from a non-word-addressed memory.
    Read,
    /// Write a byte to a non-word-addressed, non-paged memory.
    Write,
    /// Read the low byte of a 16-bit word (word-addressed flash).
    ReadLo,
    /// Read the high byte of a 16-bit word.
    ReadHi,
    /// Write the low byte of a 16-bit word.
    WriteLo,
    /// Write the high byte of a 16-bit word.
    WriteHi,
    /// Stage the low byte of a word into the device's page buffer.
    LoadPageLo,
    /// Stage the high byte of a word into the device's page buffer.
    LoadPageHi,
    /// Commit a staged page to the memory array.
    WritePage,
    /// Erase the whole chip.
    ChipErase,
    /// Enter programming mode.
    PgmEnable,
    /// Load an address extension (for memories larger than the opcode's
    /// native address span).
    LoadExtAddr,
}

/// What one bit of an [`Opcode`]'s 32-bit instruction template is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    /// This instruction bit carries no information; it is left at 0.
    Ignore,
    /// This instruction bit is always set to [`CmdBit::value`].
    Literal,
    /// This instruction bit reflects address bit [`CmdBit::bit_no`] (0..32).
    AddressBit,
    /// This instruction bit reflects input-data bit [`CmdBit::bit_no`] (0..8).
    InputBit,
    /// This instruction bit reflects output-data bit [`CmdBit::bit_no`] (0..8).
    OutputBit,
}

/// One of the 32 instruction-bit descriptors inside an [`Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdBit {
    /// What this bit is used for.
    pub kind: BitKind,
    /// Literal value, meaningful only when `kind == BitKind::Literal`.
    pub value: bool,
    /// Which address/input/output bit this reflects, meaningful for every
    /// kind except `Ignore` and `Literal`.
    pub bit_no: u8,
}

impl CmdBit {
    /// A bit that carries no information.
    pub const IGNORE: CmdBit = CmdBit { kind: BitKind::Ignore, value: false, bit_no: 0 };

    /// A bit fixed to `value`.
    pub const fn literal(value: bool) -> CmdBit {
        CmdBit { kind: BitKind::Literal, value, bit_no: 0 }
    }

    /// A bit that reflects address bit `bit_no`.
    pub const fn address(bit_no: u8) -> CmdBit {
        CmdBit { kind: BitKind::AddressBit, value: false, bit_no }
    }

    /// A bit that reflects input-data bit `bit_no`.
    pub const fn input(bit_no: u8) -> CmdBit {
        CmdBit { kind: BitKind::InputBit, value: false, bit_no }
    }

    /// A bit that reflects output-data bit `bit_no`.
    pub const fn output(bit_no: u8) -> CmdBit {
        CmdBit { kind: BitKind::OutputBit, value: false, bit_no }
    }
}

/// A 32-bit instruction template: one [`CmdBit`] per wire bit.
#[derive(Clone, PartialEq, Eq)]
pub struct Opcode {
    bits: [CmdBit; 32],
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opcode").field("bits", &&self.bits[..]).finish()
    }
}

/// Maps instruction-bit index `i` to `(byte, bit)`: byte `3 - i/8`, bit `i%8`.
const fn bit_pos(i: usize) -> (usize, u8) {
    (3 - i / 8, (i % 8) as u8)
}

fn set_bit(frame: &mut Frame, i: usize, val: bool) {
    let (byte, bit) = bit_pos(i);
    if val {
        frame[byte] |= 1 << bit;
    } else {
        frame[byte] &= !(1 << bit);
    }
}

fn get_bit(frame: &Frame, i: usize) -> bool {
    let (byte, bit) = bit_pos(i);
    (frame[byte] >> bit) & 1 == 1
}

impl Opcode {
    /// Builds an opcode from exactly 32 bit descriptors.
    pub const fn new(bits: [CmdBit; 32]) -> Opcode {
        Opcode { bits }
    }

    /// An opcode with every bit set to [`CmdBit::IGNORE`], for incremental
    /// construction with [`Opcode::with_bit`].
    pub const fn blank() -> Opcode {
        Opcode { bits: [CmdBit::IGNORE; 32] }
    }

    /// Returns a copy of this opcode with instruction bit `i` replaced.
    pub const fn with_bit(mut self, i: usize, bit: CmdBit) -> Opcode {
        self.bits[i] = bit;
        self
    }

    /// The 32 bit descriptors, indexed as described in the module docs.
    pub fn bits(&self) -> &[CmdBit; 32] {
        &self.bits
    }

    /// Clears/sets every `Literal` bit in `frame`.
    pub fn set_literals(&self, frame: &mut Frame) {
        for (i, bit) in self.bits.iter().enumerate() {
            if bit.kind == BitKind::Literal {
                set_bit(frame, i, bit.value);
            }
        }
    }

    /// Projects `addr`'s bits into every `AddressBit` position in `frame`.
    pub fn set_address(&self, frame: &mut Frame, addr: u32) {
        for (i, bit) in self.bits.iter().enumerate() {
            if bit.kind == BitKind::AddressBit {
                set_bit(frame, i, (addr >> bit.bit_no) & 1 == 1);
            }
        }
    }

    /// Projects `data`'s bits into every `InputBit` position in `frame`.
    pub fn set_input(&self, frame: &mut Frame, data: u8) {
        for (i, bit) in self.bits.iter().enumerate() {
            if bit.kind == BitKind::InputBit {
                set_bit(frame, i, (data >> bit.bit_no) & 1 == 1);
            }
        }
    }

    /// Reassembles a data byte from every `OutputBit` position in `res`.
    /// Bits outside any `OutputBit` position remain 0 in the result.
    pub fn get_output(&self, res: &Frame) -> u8 {
        let mut out = 0u8;
        for (i, bit) in self.bits.iter().enumerate() {
            if bit.kind == BitKind::OutputBit && get_bit(res, i) {
                out |= 1 << bit.bit_no;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A read-write opcode with all 8 data bits mapped straight through,
    /// the way a classic byte-read/byte-write instruction does.
    fn rw_opcode() -> Opcode {
        let mut op = Opcode::blank();
        for n in 0..8u8 {
            op = op.with_bit(n as usize, CmdBit::input(n));
            op = op.with_bit(8 + n as usize, CmdBit::output(n));
        }
        op
    }

    #[test]
    fn encoding_round_trips_every_byte() {
        let op = rw_opcode();
        for d in 0..=255u8 {
            let mut frame = [0u8; 4];
            op.set_input(&mut frame, d);
            assert_eq!(op.get_output(&frame), d, "round-trip failed for {d:#04x}");
        }
    }

    /// An opcode with all 32 bits mapped to address bits 0..32, to exercise
    /// the full address span.
    fn address_opcode() -> Opcode {
        let mut op = Opcode::blank();
        for n in 0..32u8 {
            op = op.with_bit(n as usize, CmdBit::address(n));
        }
        op
    }

    #[test]
    fn address_round_trips() {
        let op = address_opcode();
        for addr in [0u32, 1, 0x2A, 0xFFFF_FFFF, 0x1234_5678, 0xAAAA_AAAA] {
            let mut frame = [0u8; 4];
            op.set_address(&mut frame, addr);
            let mut readback = 0u32;
            for n in 0..32u8 {
                let (byte, bit) = bit_pos(n as usize);
                if (frame[byte] >> bit) & 1 == 1 {
                    readback |= 1 << n;
                }
            }
            assert_eq!(readback, addr);
        }
    }

    #[test]
    fn literal_bits_are_fixed_regardless_of_other_calls() {
        let op = Opcode::blank()
            .with_bit(31, CmdBit::literal(true))
            .with_bit(30, CmdBit::literal(false))
            .with_bit(0, CmdBit::input(0));
        let mut frame = [0u8; 4];
        op.set_literals(&mut frame);
        op.set_input(&mut frame, 0xFF);
        assert_eq!(frame[0] & 0xC0, 0x80, "bit 31 set, bit 30 clear");
    }

    #[test]
    fn bit_index_zero_is_lsb_of_last_byte() {
        let mut frame = [0u8; 4];
        set_bit(&mut frame, 0, true);
        assert_eq!(frame, [0, 0, 0, 0x01]);
        let mut frame = [0u8; 4];
        set_bit(&mut frame, 31, true);
        assert_eq!(frame, [0x80, 0, 0, 0]);
    }
}
