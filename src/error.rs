//! Error taxonomy for the programming engine.
//!
//! The teacher crate this engine grew out of gets away with a 4-variant
//! hand-rolled `Error<E, GPIO>` because its surface is tiny (one SPI error,
//! one GPIO error, one protocol error). This engine's surface is wider and
//! almost every variant carries structured fields (an address, a retry
//! count, an expected/actual pair), which is exactly the shape `thiserror`
//! exists to cover without writing `Display`/`Debug` by hand for each one.

use crate::opcode::OpKind;

/// Everything that can go wrong while driving a part through a
/// [`Programmer`](crate::programmer::Programmer).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No memory matched `name` after prefix resolution (zero or more than
    /// one candidate matched).
    #[error("no memory matches {0:?}")]
    UnknownMemory(String),

    /// The memory has neither a `READ` nor a `READ_LO` opcode.
    #[error("memory {mem} has no read opcode")]
    UnsupportedRead {
        /// Name of the memory that was asked to read.
        mem: String,
    },

    /// The memory has no `WRITE`, `LOADPAGE_LO`, or `WRITE_LO` opcode.
    #[error("memory {mem} has no write opcode")]
    UnsupportedWrite {
        /// Name of the memory that was asked to write.
        mem: String,
    },

    /// The memory is paged but has no `WRITEPAGE` opcode.
    #[error("memory {mem} has no page-write opcode")]
    UnsupportedPage {
        /// Name of the memory whose page commit failed to resolve.
        mem: String,
    },

    /// A part-level operation (e.g. `PGM_ENABLE`) has no configured opcode.
    #[error("operation {0:?} is not defined for this part")]
    UnsupportedOperation(OpKind),

    /// `program_enable` never saw the expected echo.
    #[error("program enable failed: device did not echo the expected byte")]
    PgmEnableFailed,

    /// Device resync exceeded its retry bound.
    #[error("device is not responding")]
    NotResponding,

    /// A polled write never converged.
    #[error("write to {mem} at address 0x{addr:06x} did not converge after {tries} attempts")]
    WriteFailed {
        /// Name of the memory being written.
        mem: String,
        /// Byte address within the memory.
        addr: usize,
        /// Number of readback attempts made before giving up.
        tries: u32,
    },

    /// `verify_region` found a byte that does not match.
    #[error("verify mismatch in {mem} at 0x{addr:06x}: expected 0x{expected:02x}, got 0x{actual:02x}")]
    VerifyMismatch {
        /// Name of the memory being verified.
        mem: String,
        /// Byte address within the memory.
        addr: usize,
        /// Value found in the reference image.
        expected: u8,
        /// Value found in the reread image.
        actual: u8,
    },

    /// A transport-level operation exceeded its deadline.
    #[error("transport timed out")]
    TransportTimeout,

    /// A transport-level I/O failure, opaque to the engine.
    #[error("transport I/O error: {0}")]
    TransportIo(String),

    /// An optional capability was invoked on a transport that did not
    /// override its default implementation.
    #[error("{0} is not supported by this transport")]
    NotSupportedByTransport(&'static str),

    /// A configuration invariant from the data model (§3) was violated.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse-grained progress callback invoked during region I/O: current
/// byte count, total byte count, and a human label (e.g. `"flash"`).
///
/// The engine never calls this from within a time-critical polled loop;
/// see the byte I/O layer's write state machine.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + 'a;
