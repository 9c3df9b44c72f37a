//! Component I — human-readable introspection of a part and its
//! memory-operation tables. Not a wire format (spec.md §4.8): any
//! equivalent rendering satisfies the contract, so this is plain
//! `Display`, the way a CLI would print it, rather than a serialization
//! format.

use std::fmt;

use crate::memory::Memory;
use crate::opcode::{BitKind, CmdBit};
use crate::part::Part;

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.description, self.id)?;
        writeln!(f, "  chip erase delay   : {} us", self.chip_erase_delay_us)?;
        writeln!(f, "  reset line         : {:?}", self.reset_disposition)?;
        writeln!(f, "  capabilities       : {:?}", self.capabilities)?;
        if let Some(pagel) = self.device.pagel {
            writeln!(f, "  PAGEL pin          : {pagel}")?;
        }
        if let Some(bs2) = self.device.bs2 {
            writeln!(f, "  BS2 pin            : {bs2}")?;
        }
        writeln!(f, "  memories:")?;
        writeln!(
            f,
            "  {:<12} {:>6} {:>6} {:>10} {:>6} {:>10} {:>10} {:>12}",
            "name", "paged", "size", "page size", "pages", "min delay", "max delay", "sentinels"
        )?;
        for mem in &self.memories {
            writeln!(
                f,
                "  {:<12} {:>6} {:>6} {:>10} {:>6} {:>9}u {:>9}u   {:02x} {:02x}",
                mem.name,
                mem.paged,
                mem.size,
                mem.page_size,
                mem.num_pages,
                mem.min_write_delay_us,
                mem.max_write_delay_us,
                mem.readback_sentinels[0],
                mem.readback_sentinels[1],
            )?;
        }
        Ok(())
    }
}

/// A verbose per-memory table of every configured operation and, for
/// each, its 32 CmdBit rows. Wraps a `&Memory` because `Memory` itself
/// has no natural single-line `Display` (its [`fmt::Display`] here is the
/// terse per-row form used by [`Part`]'s listing).
pub struct MemOpTable<'a>(pub &'a Memory);

impl fmt::Display for MemOpTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mem = self.0;
        writeln!(f, "operations for {}:", mem.name)?;
        for (kind, op) in &mem.ops {
            writeln!(f, "  {kind:?}:")?;
            writeln!(f, "    {:>3} {:<12} {:>7} {:>7}", "bit", "kind", "bit_no", "literal")?;
            for (i, bit) in op.bits().iter().enumerate() {
                writeln!(f, "    {:>3} {:<12} {:>7} {:>7}", i, kind_label(bit), bit_no_label(bit), literal_label(bit))?;
            }
        }
        Ok(())
    }
}

fn kind_label(bit: &CmdBit) -> &'static str {
    match bit.kind {
        BitKind::Ignore => "ignore",
        BitKind::Literal => "literal",
        BitKind::AddressBit => "address",
        BitKind::InputBit => "input",
        BitKind::OutputBit => "output",
    }
}

fn bit_no_label(bit: &CmdBit) -> String {
    match bit.kind {
        BitKind::Ignore | BitKind::Literal => "-".to_string(),
        _ => bit.bit_no.to_string(),
    }
}

fn literal_label(bit: &CmdBit) -> String {
    match bit.kind {
        BitKind::Literal => (bit.value as u8).to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{OpKind, Opcode};

    #[test]
    fn part_display_lists_every_memory() {
        let part = Part::new("m328p", "ATmegaX")
            .with_memory(Memory::new("flash", 32768).with_write_delay(0, 4500))
            .with_memory(Memory::new("eeprom", 1024).with_write_delay(9000, 9000));
        let rendered = format!("{part}");
        assert!(rendered.contains("flash"));
        assert!(rendered.contains("eeprom"));
        assert!(rendered.contains("ATmegaX"));
    }

    #[test]
    fn mem_op_table_lists_every_configured_opcode_and_all_32_bits() {
        let mem = Memory::new("flash", 2).with_op(OpKind::Read, Opcode::blank());
        let rendered = format!("{}", MemOpTable(&mem));
        assert!(rendered.contains("Read"));
        // title + kind line + column header + 32 bit rows.
        assert_eq!(rendered.lines().count(), 32 + 3);
    }
}
