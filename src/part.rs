//! Component B (the other half) — the part model.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::EngineError;
use crate::memory::Memory;
use crate::opcode::{OpKind, Opcode};

bitflags! {
    /// Which programming interfaces a part supports.
    pub struct Capabilities: u8 {
        /// The part can be programmed over SPI (the classic 4-pin
        /// RESET/SCK/MOSI/MISO interface).
        const SPI = 1 << 0;
        /// The part supports full high-voltage parallel programming.
        const PARALLEL = 1 << 1;
        /// The part supports the cheaper "pseudo" parallel mode (fewer
        /// control lines than full parallel programming).
        const PSEUDO_PARALLEL = 1 << 2;
    }
}

/// How a part's RESET line behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDisposition {
    /// RESET is a dedicated pin, free for the programmer to drive.
    Dedicated,
    /// RESET is shared with a general-purpose I/O pin.
    SharedWithIo,
}

/// Device-descriptor fields used by advanced (mostly parallel-capable)
/// programmers. All optional: most parts configured for plain SPI
/// programming leave these unset.
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor {
    /// PAGEL pin number, if this part supports parallel page programming.
    pub pagel: Option<u8>,
    /// BS2 (byte select 2) pin number.
    pub bs2: Option<u8>,
    /// Fuse byte addresses, in parallel programming address space:
    /// `(low, high, extended)`.
    pub fuse_addrs: Option<(u8, u8, u8)>,
}

/// One target MCU type: its identity, timing, capabilities, and the
/// ordered collection of memory regions it exposes.
///
/// A `Part` is created when configuration is loaded and is immutable
/// after initialization except for the memory buffers inside its
/// [`Memory`] values.
#[derive(Debug, Clone)]
pub struct Part {
    /// Short id, e.g. `"m328p"`.
    pub id: String,
    /// Long description, e.g. `"ATmega328P"`.
    pub description: String,
    /// Delay, in microseconds, to wait after issuing `CHIP_ERASE`.
    pub chip_erase_delay_us: u32,
    /// How this part's RESET line behaves.
    pub reset_disposition: ResetDisposition,
    /// Which programming interfaces this part supports.
    pub capabilities: Capabilities,
    /// Part-level opcodes: at minimum `PgmEnable` and `ChipErase`.
    pub part_ops: BTreeMap<OpKind, Opcode>,
    /// Memory regions, insertion-ordered, at most one per name.
    pub memories: Vec<Memory>,
    /// Optional device-descriptor fields for advanced programmers.
    pub device: DeviceDescriptor,
}

impl Part {
    /// Creates a part with no memories and no part-level opcodes.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Part {
        Part {
            id: id.into(),
            description: description.into(),
            chip_erase_delay_us: 0,
            reset_disposition: ResetDisposition::Dedicated,
            capabilities: Capabilities::SPI,
            part_ops: BTreeMap::new(),
            memories: Vec::new(),
            device: DeviceDescriptor::default(),
        }
    }

    /// Builder: appends a memory region. Does not check for duplicate
    /// names; call [`Part::validate`] to catch that.
    pub fn with_memory(mut self, mem: Memory) -> Part {
        self.memories.push(mem);
        self
    }

    /// Builder: attaches a part-level opcode.
    pub fn with_part_op(mut self, kind: OpKind, op: Opcode) -> Part {
        self.part_ops.insert(kind, op);
        self
    }

    /// Locates the unique memory whose name the given `name` is a prefix
    /// of. Returns `None` if zero or more than one memory matches — this
    /// ambiguity rule is part of the user-facing contract (spec.md §4.2,
    /// §9): implementations may *additionally* prefer an exact match, but
    /// must not otherwise change the "more than one match => None" rule.
    pub fn locate_memory(&self, name: &str) -> Option<&Memory> {
        if let Some(exact) = self.memories.iter().find(|m| m.name == name) {
            return Some(exact);
        }
        let mut matches = self.memories.iter().filter(|m| m.name.starts_with(name));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    /// Mutable counterpart of [`Part::locate_memory`], used by the I/O
    /// layers to write into a memory's buffer.
    pub fn locate_memory_mut(&mut self, name: &str) -> Option<&mut Memory> {
        let idx = self.locate_memory_index(name)?;
        Some(&mut self.memories[idx])
    }

    /// Index form of [`Part::locate_memory`], useful when a caller needs
    /// to split a borrow of `self.memories`.
    pub fn locate_memory_index(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.memories.iter().position(|m| m.name == name) {
            return Some(idx);
        }
        let mut matches = self
            .memories
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name.starts_with(name));
        let (first, _) = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    /// Deep-copies this part, including every memory's current buffer
    /// contents. Used to hold a "reread from the device" image that can be
    /// diffed against the original via [`crate::region::verify_region`]
    /// without the two `Part`s aliasing each other's buffers.
    pub fn duplicate(&self) -> Part {
        self.clone()
    }

    /// Allocates (zeroes) a buffer for every memory according to its
    /// `size`. Called at part instantiation, to reset a part to its
    /// as-configured state.
    pub fn initialize_buffers(&mut self) {
        for mem in &mut self.memories {
            mem.buf = vec![0; mem.size];
        }
    }

    /// Checks the part-level invariants of spec.md §3: at most one memory
    /// per name, and every memory individually valid.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = std::collections::HashSet::new();
        for mem in &self.memories {
            if !seen.insert(mem.name.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "part {} has more than one memory named {}",
                    self.id, mem.name
                )));
            }
            mem.validate()?;
        }
        if !self.part_ops.contains_key(&OpKind::PgmEnable) {
            return Err(EngineError::InvalidConfig(format!(
                "part {} has no PGM_ENABLE opcode",
                self.id
            )));
        }
        Ok(())
    }
}
