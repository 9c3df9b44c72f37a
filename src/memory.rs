//! Component B (half) — the memory region model.

use std::collections::BTreeMap;

use crate::opcode::{OpKind, Opcode};

/// One memory region of a [`Part`](crate::part::Part): `"flash"`,
/// `"eeprom"`, `"lfuse"`, `"hfuse"`, `"efuse"`, `"lock"`, `"calibration"`,
/// `"signature"`, and so on.
#[derive(Debug, Clone)]
pub struct Memory {
    /// Free-form name. The core resolves memories by *prefix* match on
    /// this name (see [`crate::part::Part::locate_memory`]).
    pub name: String,
    /// Size in bytes.
    pub size: usize,
    /// Whether this memory is written one page at a time via `WRITEPAGE`.
    pub paged: bool,
    /// Page size in bytes. Only meaningful when `paged`.
    pub page_size: usize,
    /// Number of pages. Only meaningful when `paged`; `num_pages *
    /// page_size == size`.
    pub num_pages: usize,
    /// Minimum delay, in microseconds, before the first readback poll
    /// after a byte write.
    pub min_write_delay_us: u32,
    /// Worst-case delay, in microseconds, to wait when polling is
    /// unreliable or unsupported.
    pub max_write_delay_us: u32,
    /// The two data values that make polled readback unreliable when seen
    /// in a just-written cell.
    pub readback_sentinels: [u8; 2],
    /// Whether the target must be power-cycled for a write to this memory
    /// to take effect (used by the polled-write state machine).
    pub power_off_after_write: bool,
    /// Per-operation opcode map. At most one opcode per [`OpKind`].
    pub ops: BTreeMap<OpKind, Opcode>,
    /// The most recently read, or about-to-be-written, image of this
    /// memory. Always `size` bytes long; zero-initialized at construction.
    pub buf: Vec<u8>,
}

impl Memory {
    /// Creates a non-paged memory of `size` bytes with a zeroed buffer and
    /// no configured opcodes.
    pub fn new(name: impl Into<String>, size: usize) -> Memory {
        Memory {
            name: name.into(),
            size,
            paged: false,
            page_size: 0,
            num_pages: 0,
            min_write_delay_us: 0,
            max_write_delay_us: 0,
            readback_sentinels: [0x00, 0xFF],
            power_off_after_write: false,
            ops: BTreeMap::new(),
            buf: vec![0; size],
        }
    }

    /// Builder: attaches an opcode for one operation kind.
    pub fn with_op(mut self, kind: OpKind, op: Opcode) -> Memory {
        self.ops.insert(kind, op);
        self
    }

    /// Builder: marks this memory as paged, with `page_size` bytes per
    /// page. `num_pages` is derived from `size / page_size`.
    pub fn with_paging(mut self, page_size: usize) -> Memory {
        self.paged = true;
        self.page_size = page_size;
        self.num_pages = if page_size == 0 { 0 } else { self.size / page_size };
        self
    }

    /// Builder: sets the min/max write delay, in microseconds.
    pub fn with_write_delay(mut self, min_us: u32, max_us: u32) -> Memory {
        self.min_write_delay_us = min_us;
        self.max_write_delay_us = max_us;
        self
    }

    /// Builder: sets the polled-readback sentinel bytes.
    pub fn with_sentinels(mut self, a: u8, b: u8) -> Memory {
        self.readback_sentinels = [a, b];
        self
    }

    /// Builder: marks this memory as requiring a power cycle for a write
    /// to take effect.
    pub fn with_power_off_after_write(mut self) -> Memory {
        self.power_off_after_write = true;
        self
    }

    /// Checks the invariants spec.md §3 places on a single memory:
    /// buffer length matches `size`; a paged memory's page geometry
    /// divides evenly; LO/HI opcode pairs are either both present or both
    /// absent.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        use crate::error::EngineError;

        if self.buf.len() != self.size {
            return Err(EngineError::InvalidConfig(format!(
                "memory {} has buffer length {} but size {}",
                self.name,
                self.buf.len(),
                self.size
            )));
        }

        if self.paged {
            if self.page_size == 0 || self.size % self.page_size != 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "memory {} has page_size {} that does not evenly divide size {}",
                    self.name, self.page_size, self.size
                )));
            }
            if self.num_pages * self.page_size != self.size {
                return Err(EngineError::InvalidConfig(format!(
                    "memory {} has num_pages * page_size != size",
                    self.name
                )));
            }
            if !self.ops.contains_key(&OpKind::LoadPageLo)
                || !self.ops.contains_key(&OpKind::LoadPageHi)
                || !self.ops.contains_key(&OpKind::WritePage)
            {
                return Err(EngineError::InvalidConfig(format!(
                    "paged memory {} is missing LOADPAGE_LO/LOADPAGE_HI/WRITEPAGE",
                    self.name
                )));
            }
        }

        let lo_hi_pairs = [
            (OpKind::ReadLo, OpKind::ReadHi),
            (OpKind::WriteLo, OpKind::WriteHi),
            (OpKind::LoadPageLo, OpKind::LoadPageHi),
        ];
        for (lo, hi) in lo_hi_pairs {
            if self.ops.contains_key(&lo) != self.ops.contains_key(&hi) {
                return Err(EngineError::InvalidConfig(format!(
                    "memory {} defines {:?} without its {:?} counterpart",
                    self.name, lo, hi
                )));
            }
        }

        Ok(())
    }
}
