//! Component C — the programmer capability interface.
//!
//! A [`Programmer`] is the narrow set of operations a transport driver
//! (serial bit-bang, USB, STK500, JTAG ICE mkII, BusPirate, …) must
//! provide for the engine in this crate to drive it. Every capability has
//! a default implementation; mandatory ones (`open`, `close`, `cmd`) fail
//! with [`EngineError::NotSupportedByTransport`] by default, the same way
//! the teacher's `Error` type is returned rather than panicking on an
//! unimplemented combination. `program_enable` and `chip_erase` have
//! *generic* defaults built on top of `cmd` and the opcode engine, so a
//! plain SPI-class transport only has to implement `cmd`.

use crate::error::EngineError;
use crate::memory::Memory;
use crate::opcode::{Frame, OpKind};
use crate::part::Part;

/// The capability set a transport exposes to the engine.
///
/// See the module docs for the default-implementation policy.
pub trait Programmer {
    /// Acquires the transport (opens the serial/USB handle, etc).
    fn open(&mut self, _port: &str) -> Result<(), EngineError> {
        Ok(())
    }

    /// Releases the transport. Must be safe to call more than once and
    /// after a fatal error (scoped acquisition with guaranteed release).
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Performs device power-up and whatever transport-specific
    /// synchronization is needed before [`Programmer::cmd`] can be used.
    /// Session-level reset-pulse and program-enable sequencing lives in
    /// [`crate::session::initialize_device`], which calls this first.
    fn initialize(&mut self, _part: &Part) -> Result<(), EngineError> {
        Ok(())
    }

    /// Brackets the start of a programming session. May be a no-op.
    fn enable(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Brackets the end of a programming session. May be a no-op.
    fn disable(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Transmits one 4-byte SPI instruction and returns the 4-byte
    /// response. The single mandatory wire primitive for SPI-class
    /// programmers; JTAG/UPDI-style transports instead override
    /// [`Programmer::direct_read_byte`]/[`Programmer::direct_write_byte`]
    /// and never need this.
    fn cmd(&mut self, _frame: Frame) -> Result<Frame, EngineError> {
        Err(EngineError::NotSupportedByTransport("cmd"))
    }

    /// Issues the part's `PGM_ENABLE` opcode and checks that the device
    /// echoes the expected byte (cmd byte 1) back in response byte 2.
    fn program_enable(&mut self, part: &Part) -> Result<(), EngineError> {
        let op = part
            .part_ops
            .get(&OpKind::PgmEnable)
            .ok_or(EngineError::UnsupportedOperation(OpKind::PgmEnable))?;
        let mut frame: Frame = [0; 4];
        op.set_literals(&mut frame);
        let expected = frame[1];
        let res = self.cmd(frame)?;
        if res[2] == expected {
            Ok(())
        } else {
            Err(EngineError::PgmEnableFailed)
        }
    }

    /// Issues the part's `CHIP_ERASE` opcode and waits
    /// `part.chip_erase_delay_us`.
    fn chip_erase(&mut self, part: &Part) -> Result<(), EngineError> {
        let op = part
            .part_ops
            .get(&OpKind::ChipErase)
            .ok_or(EngineError::UnsupportedOperation(OpKind::ChipErase))?;
        let mut frame: Frame = [0; 4];
        op.set_literals(&mut frame);
        self.cmd(frame)?;
        crate::wait::sleep_us(part.chip_erase_delay_us as u64);
        Ok(())
    }

    /// Optional fast path for bulk reads of `"flash"`/`"eeprom"`. Fills
    /// `mem.buf[..n_bytes]` and returns the number of bytes read.
    fn paged_load(
        &mut self,
        _part: &Part,
        _mem: &mut Memory,
        _page_size: usize,
        _n_bytes: usize,
    ) -> Result<usize, EngineError> {
        Err(EngineError::NotSupportedByTransport("paged_load"))
    }

    /// Optional fast path for bulk writes of `"flash"`/`"eeprom"`. Writes
    /// `mem.buf[..n_bytes]` and returns the number of bytes written.
    fn paged_write(
        &mut self,
        _part: &Part,
        _mem: &Memory,
        _page_size: usize,
        _n_bytes: usize,
    ) -> Result<usize, EngineError> {
        Err(EngineError::NotSupportedByTransport("paged_write"))
    }

    /// Direct byte read, for transports that do not expose raw SPI (JTAG
    /// ICE mkII, UPDI). When unimplemented, [`crate::byteio::read_byte`]
    /// falls back to the opcode/`cmd` path.
    fn direct_read_byte(&mut self, _part: &Part, _mem: &Memory, _addr: usize) -> Result<u8, EngineError> {
        Err(EngineError::NotSupportedByTransport("direct_read_byte"))
    }

    /// Direct byte write, the write-side counterpart of
    /// [`Programmer::direct_read_byte`].
    fn direct_write_byte(
        &mut self,
        _part: &Part,
        _mem: &Memory,
        _addr: usize,
        _data: u8,
    ) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("direct_write_byte"))
    }

    /// Reads the device's 3-byte JEDEC-style signature directly, bypassing
    /// the generic byte-read path. [`crate::session::signature`] does not
    /// use this (it is defined to be equivalent to reading the
    /// `"signature"` memory region), but transports may still offer it.
    fn read_sig_bytes(&mut self, _part: &Part, _mem: &Memory) -> Result<[u8; 3], EngineError> {
        Err(EngineError::NotSupportedByTransport("read_sig_bytes"))
    }

    /// Declared page-size hint used for non-paged memories whose region
    /// I/O still wants to batch through `paged_load`/`paged_write`.
    fn page_size_hint(&self) -> usize {
        0
    }

    /// Sets the bit-clock period, in seconds, for bit-bang SPI.
    fn set_sck_period(&mut self, _seconds: f64) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("set_sck_period"))
    }

    /// Sets the target supply voltage.
    fn set_vtarget(&mut self, _volts: f64) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("set_vtarget"))
    }

    /// Sets the analog reference voltage.
    fn set_varef(&mut self, _volts: f64) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("set_varef"))
    }

    /// Sets the target oscillator frequency.
    fn set_fosc(&mut self, _hz: f64) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("set_fosc"))
    }

    /// Controls the power supply, for transports with a switchable VCC
    /// pin. Used by the polled-write power-cycle path.
    fn set_vcc(&mut self, _on: bool) -> Result<(), EngineError> {
        Err(EngineError::NotSupportedByTransport("set_vcc"))
    }

    /// Pulses SCK once, outside of a `cmd` transaction. Used by
    /// [`crate::session::initialize_device`]'s resync loop to shift a
    /// stuck target one bit. Default no-op, since many higher-level
    /// transports (STK500-class) resync without ever needing this.
    fn pulse_sck(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Informational "programming in progress" LED. Default no-op.
    fn pgm_led(&mut self, _on: bool) -> Result<(), EngineError> {
        Ok(())
    }

    /// Informational "error" LED. Default no-op.
    fn err_led(&mut self, _on: bool) -> Result<(), EngineError> {
        Ok(())
    }

    /// Informational "ready" LED. Default no-op.
    fn rdy_led(&mut self, _on: bool) -> Result<(), EngineError> {
        Ok(())
    }

    /// Informational "verifying" LED. Default no-op.
    fn vfy_led(&mut self, _on: bool) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Calls `f`, treating [`EngineError::NotSupportedByTransport`] as "no
/// fast path available" rather than a fatal error. Every optional
/// capability in this crate is consumed through this helper so the
/// try-then-fall-back policy of spec.md §4.4/§4.5 is expressed once.
pub(crate) fn optional<T>(result: Result<T, EngineError>) -> Result<Option<T>, EngineError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(EngineError::NotSupportedByTransport(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
