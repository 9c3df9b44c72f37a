//! Component G — session lifecycle: `initialize_device`, `chip_erase`,
//! `signature`, `close`.

use log::{info, warn};

use crate::byteio;
use crate::cycles;
use crate::error::EngineError;
use crate::part::Part;
use crate::programmer::{optional, Programmer};
use crate::region;
use crate::wait;

/// AT90S1200 pre-dates the program-enable echo check the rest of the
/// family supports; the reference implementation special-cases it by id.
const AT90S1200_ID: &str = "AT90S1200";

const RESYNC_ATTEMPTS: u32 = 32;

/// Powers up the target, runs the transport's reset/sync sequence, then
/// brings the device into programming mode via `PGM_ENABLE`, resyncing up
/// to [`RESYNC_ATTEMPTS`] times if the echo doesn't match.
pub fn initialize_device<P: Programmer + ?Sized>(pgm: &mut P, part: &Part) -> Result<(), EngineError> {
    if optional(pgm.set_vcc(true))?.is_some() {
        wait::sleep_ms(100);
    }
    pgm.initialize(part)?;

    if part.id == AT90S1200_ID {
        // No echo check, no resync: issue program-enable once and trust it.
        let _ = pgm.program_enable(part);
        return Ok(());
    }

    for attempt in 1..=RESYNC_ATTEMPTS {
        match pgm.program_enable(part) {
            Ok(()) => {
                let _ = pgm.rdy_led(true);
                return Ok(());
            }
            Err(EngineError::PgmEnableFailed) => {
                if attempt < RESYNC_ATTEMPTS {
                    pgm.pulse_sck()?;
                }
            }
            Err(e) => return Err(e),
        }
    }

    let _ = pgm.err_led(true);
    Err(EngineError::NotResponding)
}

fn read_cycle_tail<P: Programmer + ?Sized>(pgm: &mut P, part: &mut Part, idx: usize) -> Result<(), EngineError> {
    let size = part.memories[idx].size;
    for addr in (size - 4)..size {
        let byte = {
            let part_ro: &Part = part;
            byteio::read_byte(pgm, part_ro, &part_ro.memories[idx], addr)?
        };
        part.memories[idx].buf[addr] = byte;
    }
    Ok(())
}

fn write_cycle_tail<P: Programmer + ?Sized>(pgm: &mut P, part: &Part, idx: usize) -> Result<(), EngineError> {
    let size = part.memories[idx].size;
    for addr in (size - 4)..size {
        let mem = &part.memories[idx];
        let data = mem.buf[addr];
        byteio::write_byte(pgm, part, mem, addr, data)?;
    }
    Ok(())
}

/// Erases the whole chip and, if the part has an "eeprom" memory at least
/// 4 bytes long, tracks and increments the erase/rewrite cycle counter
/// stored in its last 4 bytes.
pub fn chip_erase<P: Programmer + ?Sized>(pgm: &mut P, part: &mut Part) -> Result<(), EngineError> {
    let tracked_idx = part.locate_memory_index("eeprom").filter(|&idx| part.memories[idx].size >= 4);

    let prior_count = if let Some(idx) = tracked_idx {
        read_cycle_tail(pgm, part, idx)?;
        Some(cycles::get_cycle_count(&part.memories[idx])?)
    } else {
        None
    };

    {
        let part_ro: &Part = part;
        pgm.chip_erase(part_ro)?;
    }
    info!("chip erase issued for {}", part.id);
    initialize_device(pgm, part)?;

    if let (Some(idx), Some(prev)) = (tracked_idx, prior_count) {
        let next = prev.wrapping_add(1);
        cycles::put_cycle_count(&mut part.memories[idx], next)?;
        write_cycle_tail(pgm, part, idx)?;
        info!("{} erase/rewrite cycle count now {next}", part.id);
    }

    Ok(())
}

/// Reads the device's signature bytes, equivalent to reading the whole
/// `"signature"` memory region.
pub fn signature<P: Programmer + ?Sized>(pgm: &mut P, part: &mut Part) -> Result<Vec<u8>, EngineError> {
    let idx = part
        .locate_memory_index("signature")
        .ok_or_else(|| EngineError::UnknownMemory("signature".into()))?;
    region::read_region(pgm, part, idx, 0, None)?;
    Ok(part.memories[idx].buf.clone())
}

/// Tears the session down. Always attempts both `disable` and `close`
/// (scoped-acquisition release on every exit path), surfacing `close`'s
/// error first since it is the more fundamental failure to report.
pub fn close<P: Programmer + ?Sized>(pgm: &mut P) -> Result<(), EngineError> {
    let disable_result = pgm.disable();
    if let Err(ref e) = disable_result {
        warn!("disable failed during session close: {e}");
    }
    pgm.close()?;
    disable_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::opcode::{CmdBit, Frame, OpKind, Opcode};
    use std::cell::RefCell;

    struct Resync {
        program_enable_calls: RefCell<u32>,
        pulse_calls: RefCell<u32>,
        succeed_on_attempt: u32,
    }

    impl Programmer for Resync {
        fn cmd(&mut self, _frame: Frame) -> Result<Frame, EngineError> {
            *self.program_enable_calls.borrow_mut() += 1;
            if *self.program_enable_calls.borrow() == self.succeed_on_attempt {
                Ok([0, 0x53, 0x53, 0])
            } else {
                Ok([0, 0x53, 0x00, 0])
            }
        }

        fn pulse_sck(&mut self) -> Result<(), EngineError> {
            *self.pulse_calls.borrow_mut() += 1;
            Ok(())
        }
    }

    /// A PGM_ENABLE opcode whose second command byte is the classic 0x53
    /// literal, so the default `program_enable` has a non-zero expected
    /// echo byte to compare against.
    fn pgm_enable_0x53() -> Opcode {
        let mut op = Opcode::blank();
        for n in 0..8u8 {
            op = op.with_bit(16 + n as usize, CmdBit::literal((0x53 >> n) & 1 == 1));
        }
        op
    }

    fn atmega_like() -> Part {
        Part::new("ATmegaX", "ATmegaX").with_part_op(OpKind::PgmEnable, pgm_enable_0x53())
    }

    #[test]
    fn s5_initialize_resyncs_and_succeeds_on_fourth_attempt() {
        let part = atmega_like();
        let mut pgm =
            Resync { program_enable_calls: RefCell::new(0), pulse_calls: RefCell::new(0), succeed_on_attempt: 4 };

        initialize_device(&mut pgm, &part).unwrap();

        assert_eq!(*pgm.program_enable_calls.borrow(), 4);
        assert_eq!(*pgm.pulse_calls.borrow(), 3);
    }

    #[test]
    fn initialize_fails_after_32_resync_attempts() {
        let part = atmega_like();
        let mut pgm =
            Resync { program_enable_calls: RefCell::new(0), pulse_calls: RefCell::new(0), succeed_on_attempt: 99 };

        let err = initialize_device(&mut pgm, &part).unwrap_err();
        assert!(matches!(err, EngineError::NotResponding));
        assert_eq!(*pgm.program_enable_calls.borrow(), 32);
        assert_eq!(*pgm.pulse_calls.borrow(), 31);
    }

    #[test]
    fn at90s1200_skips_the_resync_loop() {
        let part = Part::new(AT90S1200_ID, "AT90S1200").with_part_op(OpKind::PgmEnable, Opcode::blank());
        let mut pgm =
            Resync { program_enable_calls: RefCell::new(0), pulse_calls: RefCell::new(0), succeed_on_attempt: 99 };

        initialize_device(&mut pgm, &part).unwrap();

        assert_eq!(*pgm.program_enable_calls.borrow(), 1);
        assert_eq!(*pgm.pulse_calls.borrow(), 0);
    }

    struct ChipEraseMock {
        eeprom: Vec<u8>,
        erase_calls: u32,
    }

    impl Programmer for ChipEraseMock {
        fn initialize(&mut self, _part: &Part) -> Result<(), EngineError> {
            Ok(())
        }
        fn program_enable(&mut self, _part: &Part) -> Result<(), EngineError> {
            Ok(())
        }
        fn chip_erase(&mut self, _part: &Part) -> Result<(), EngineError> {
            self.erase_calls += 1;
            Ok(())
        }
        fn direct_read_byte(&mut self, _part: &Part, _mem: &Memory, addr: usize) -> Result<u8, EngineError> {
            Ok(self.eeprom[addr])
        }
        fn direct_write_byte(&mut self, _part: &Part, _mem: &Memory, addr: usize, data: u8) -> Result<(), EngineError> {
            self.eeprom[addr] = data;
            Ok(())
        }
    }

    fn part_with_eeprom(tail: [u8; 4]) -> Part {
        let mut mem = Memory::new("eeprom", 8);
        let n = mem.size;
        mem.buf[n - 4..].copy_from_slice(&tail);
        Part::new("t", "t")
            .with_part_op(OpKind::PgmEnable, Opcode::blank())
            .with_memory(mem)
    }

    #[test]
    fn chip_erase_increments_tracked_cycle_counter() {
        let mut part = part_with_eeprom([0, 0, 0, 5]);
        let mut pgm = ChipEraseMock { eeprom: vec![0, 0, 0, 0, 0, 0, 0, 5], erase_calls: 0 };

        chip_erase(&mut pgm, &mut part).unwrap();

        assert_eq!(pgm.erase_calls, 1);
        assert_eq!(pgm.eeprom[4..8], [0, 0, 0, 6]);
    }

    #[test]
    fn chip_erase_treats_absent_pattern_as_starting_from_zero() {
        let mut part = part_with_eeprom([0xFF, 0xFF, 0x00, 0x01]);
        let mut pgm = ChipEraseMock { eeprom: vec![0, 0, 0, 0, 0xFF, 0xFF, 0x00, 0x01], erase_calls: 0 };

        chip_erase(&mut pgm, &mut part).unwrap();

        assert_eq!(pgm.eeprom[4..8], [0, 0, 0, 1]);
    }

    struct FlakyClose;
    impl Programmer for FlakyClose {
        fn disable(&mut self) -> Result<(), EngineError> {
            Err(EngineError::TransportIo("disable failed".into()))
        }
    }

    #[test]
    fn close_still_calls_close_after_disable_fails() {
        let mut pgm = FlakyClose;
        let err = close(&mut pgm).unwrap_err();
        assert!(matches!(err, EngineError::TransportIo(_)));
    }
}
