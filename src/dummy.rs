//! An in-memory simulated target, backing both the CLI demo binary and
//! general-purpose tests that want a real (if fake) device rather than a
//! single-purpose scripted mock.
//!
//! Unlike the scripted mocks in other modules' `#[cfg(test)]` blocks,
//! `DummyProgrammer` bypasses the opcode engine entirely via
//! `direct_read_byte`/`direct_write_byte` — it simulates a transport that
//! happens not to expose raw SPI, the same way a JTAG ICE mkII or UPDI
//! programmer would.

use std::collections::HashMap;

use log::debug;

use crate::error::EngineError;
use crate::memory::Memory;
use crate::part::Part;
use crate::programmer::Programmer;

/// A fake target: one byte buffer per memory name, initialized to
/// `0xFF` (erased-flash convention) the first time [`DummyProgrammer::initialize`]
/// sees that memory.
#[derive(Debug, Default)]
pub struct DummyProgrammer {
    storage: HashMap<String, Vec<u8>>,
    vcc_on: bool,
}

impl DummyProgrammer {
    /// An empty simulated target; memories are allocated lazily by
    /// [`Programmer::initialize`].
    pub fn new() -> DummyProgrammer {
        DummyProgrammer::default()
    }

    /// Preloads a memory's backing storage, e.g. to simulate a part that
    /// shipped with a signature already burned in.
    pub fn seed(&mut self, mem_name: impl Into<String>, data: Vec<u8>) {
        self.storage.insert(mem_name.into(), data);
    }

    fn buf_mut(&mut self, mem: &Memory) -> Result<&mut Vec<u8>, EngineError> {
        self.storage
            .get_mut(&mem.name)
            .ok_or_else(|| EngineError::InvalidConfig(format!("dummy target has no storage for {}", mem.name)))
    }
}

impl Programmer for DummyProgrammer {
    fn open(&mut self, port: &str) -> Result<(), EngineError> {
        debug!("dummy: open {port}");
        Ok(())
    }

    fn initialize(&mut self, part: &Part) -> Result<(), EngineError> {
        for mem in &part.memories {
            self.storage.entry(mem.name.clone()).or_insert_with(|| vec![0xFF; mem.size]);
        }
        Ok(())
    }

    fn program_enable(&mut self, _part: &Part) -> Result<(), EngineError> {
        Ok(())
    }

    fn chip_erase(&mut self, part: &Part) -> Result<(), EngineError> {
        for mem in &part.memories {
            if let Some(buf) = self.storage.get_mut(&mem.name) {
                buf.iter_mut().for_each(|b| *b = 0xFF);
            }
        }
        Ok(())
    }

    fn direct_read_byte(&mut self, _part: &Part, mem: &Memory, addr: usize) -> Result<u8, EngineError> {
        let buf = self
            .storage
            .get(&mem.name)
            .ok_or_else(|| EngineError::InvalidConfig(format!("dummy target has no storage for {}", mem.name)))?;
        Ok(buf[addr])
    }

    fn direct_write_byte(&mut self, _part: &Part, mem: &Memory, addr: usize, data: u8) -> Result<(), EngineError> {
        self.buf_mut(mem)?[addr] = data;
        Ok(())
    }

    fn set_vcc(&mut self, on: bool) -> Result<(), EngineError> {
        self.vcc_on = on;
        Ok(())
    }

    fn pgm_led(&mut self, on: bool) -> Result<(), EngineError> {
        debug!("dummy: PGM led {}", if on { "on" } else { "off" });
        Ok(())
    }

    fn err_led(&mut self, on: bool) -> Result<(), EngineError> {
        debug!("dummy: ERR led {}", if on { "on" } else { "off" });
        Ok(())
    }
}
