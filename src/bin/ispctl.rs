//! A CLI front end for the engine, backed by [`ispcore::dummy::DummyProgrammer`]
//! rather than a real transport — the same role `util.rs` played for the
//! crate this one grew out of, minus an actual SPI device to drive.

use log::{error, info};

use structopt::StructOpt;

use simplelog::{LevelFilter, TermLogger, TerminalMode};

use ihex::Record;

use ispcore::dummy::DummyProgrammer;
use ispcore::memory::Memory;
use ispcore::opcode::{OpKind, Opcode};
use ispcore::part::Part;
use ispcore::{byteio, cycles, region, session};

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// Which built-in demo part to simulate
    #[structopt(long, default_value = "demo328")]
    part: String,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(Debug, PartialEq, StructOpt)]
enum Operations {
    /// Print the part's memory/operation layout
    Info,
    /// Print the configured opcode table for one memory
    ShowMemTable {
        /// Memory name (prefix match), e.g. "flash" or "eeprom"
        mem: String,
    },
    /// Print the part's memory/operation layout (alias of `info`)
    ShowPart,
    /// Read bytes from a memory region and print them
    Read {
        /// Memory name (prefix match), e.g. "flash" or "eeprom"
        mem: String,
        /// Byte address to start at
        #[structopt(parse(try_from_str = parse_hex))]
        address: usize,
        /// Number of bytes to read
        length: usize,
    },
    /// Write hex-encoded bytes into a memory region
    Write {
        mem: String,
        #[structopt(parse(try_from_str = parse_hex))]
        address: usize,
        /// Data to write, hex-encoded
        #[structopt(long)]
        data: HexData,
    },
    /// Write, then re-read and compare a memory region
    Verify {
        mem: String,
        #[structopt(parse(try_from_str = parse_hex))]
        address: usize,
        #[structopt(long)]
        data: HexData,
    },
    /// Dump a memory region into an Intel HEX file
    Dump {
        mem: String,
        #[structopt(parse(try_from_str = parse_hex))]
        address: usize,
        length: usize,
        #[structopt(long, default_value = "dump.ihex")]
        file: String,
    },
    /// Load a memory region from an Intel HEX file, then write it
    Load {
        mem: String,
        file: String,
    },
    /// Erase the whole simulated chip
    ChipErase,
    /// Print the device's erase/rewrite cycle count
    Cycles,
    /// Read and print the device's signature bytes
    Signature,
}

#[derive(Debug, PartialEq)]
struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn parse_hex(s: &str) -> Result<usize, std::num::ParseIntError> {
    usize::from_str_radix(s.trim_start_matches("0x"), 16)
}

/// A small AVR-ish part, just large enough to exercise every memory kind
/// the engine supports. `PGM_ENABLE` is the only opcode a part needs for
/// [`Part::validate`]; [`DummyProgrammer`] never consults any other
/// opcode, since it answers through `direct_read_byte`/`direct_write_byte`.
fn demo_part() -> Part {
    Part::new("demo328", "Simulated ATmegaX-class part")
        .with_part_op(OpKind::PgmEnable, Opcode::blank())
        .with_part_op(OpKind::ChipErase, Opcode::blank())
        .with_memory(Memory::new("flash", 4096))
        .with_memory(Memory::new("eeprom", 512).with_write_delay(3_600, 10_000))
        .with_memory(Memory::new("signature", 3))
        .with_memory(Memory::new("lfuse", 1))
        .with_memory(Memory::new("hfuse", 1))
        .with_memory(Memory::new("lock", 1))
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let opts = Options::from_args();

    TermLogger::init(opts.log_level, simplelog::Config::default(), TerminalMode::Mixed).unwrap();

    if opts.part != "demo328" {
        error!("unknown simulated part {:?}, only \"demo328\" is built in", opts.part);
        return Ok(());
    }

    let mut part = demo_part();
    part.validate()?;

    let mut pgm = DummyProgrammer::new();
    pgm.seed("signature", vec![0x1E, 0x95, 0x0F]);

    session::initialize_device(&mut pgm, &part)?;

    match &opts.operation {
        Operations::Info | Operations::ShowPart => {
            print!("{part}");
        }
        Operations::ShowMemTable { mem } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            print!("{}", ispcore::display::MemOpTable(&part.memories[idx]));
        }
        Operations::Read { mem, address, length } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            info!("reading {} bytes from {} at 0x{:04x}", length, part.memories[idx].name, address);
            for i in 0..*length {
                let m = &part.memories[idx];
                let byte = byteio::read_byte(&mut pgm, &part, m, address + i)?;
                print!("{byte:02x} ");
            }
            println!();
        }
        Operations::Write { mem, address, data } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            info!("writing {} bytes to {} at 0x{:04x}", data.0.len(), part.memories[idx].name, address);
            for (i, &byte) in data.0.iter().enumerate() {
                let m = &part.memories[idx];
                byteio::write_byte(&mut pgm, &part, m, address + i, byte)?;
            }
            info!("write complete");
        }
        Operations::Verify { mem, address, data } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            for (i, &byte) in data.0.iter().enumerate() {
                let m = &part.memories[idx];
                byteio::write_byte(&mut pgm, &part, m, address + i, byte)?;
            }
            for (i, &expected) in data.0.iter().enumerate() {
                let m = &part.memories[idx];
                let actual = byteio::read_byte(&mut pgm, &part, m, address + i)?;
                if actual != expected {
                    error!("verify mismatch at 0x{:04x}: expected 0x{:02x}, got 0x{:02x}", address + i, expected, actual);
                    return Ok(());
                }
            }
            info!("verify OK");
        }
        Operations::Dump { mem, address, length, file } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            let progress_label = part.memories[idx].name.clone();
            let mut cb = |done: usize, total: usize, label: &str| {
                if done == total {
                    info!("{label}: {done}/{total} bytes read");
                }
            };
            let cb: &mut ispcore::error::ProgressFn = &mut cb;
            let requested = *address + *length;
            region::read_region(&mut pgm, &mut part, idx, requested, Some(cb))?;

            let mut records = Vec::new();
            for (c, chunk) in part.memories[idx].buf[*address..*address + *length].chunks(32).enumerate() {
                records.push(Record::Data { offset: (*address + c * 32) as u16, value: chunk.to_vec() });
            }
            records.push(Record::EndOfFile);
            let text = ihex::create_object_file_representation(&records)?;
            std::fs::write(file, text)?;
            info!("dumped {progress_label} to {file}");
        }
        Operations::Load { mem, file } => {
            let idx = part
                .locate_memory_index(mem)
                .ok_or_else(|| format!("no memory matches {mem:?}"))?;
            let text = std::fs::read_to_string(file)?;
            let reader = ihex::Reader::new(&text);
            for record in reader {
                if let Record::Data { offset, value } = record? {
                    let start = offset as usize;
                    part.memories[idx].buf[start..start + value.len()].copy_from_slice(&value);
                }
            }
            let n = region::write_region(&mut pgm, &part, idx, 0, None)?;
            info!("loaded and wrote {n} bytes to {} from {file}", part.memories[idx].name);
        }
        Operations::ChipErase => {
            info!("erasing {}", part.id);
            session::chip_erase(&mut pgm, &mut part)?;
            info!("erase complete");
        }
        Operations::Cycles => {
            let idx = part
                .locate_memory_index("eeprom")
                .ok_or("part has no eeprom memory")?;
            region::read_region(&mut pgm, &mut part, idx, 0, None)?;
            let count = cycles::get_cycle_count(&part.memories[idx])?;
            info!("erase/rewrite cycle count: {count}");
        }
        Operations::Signature => {
            let sig = session::signature(&mut pgm, &mut part)?;
            info!("signature: {}", hex::encode(&sig));
        }
    }

    session::close(&mut pgm)?;
    Ok(())
}
