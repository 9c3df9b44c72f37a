//! Components E/F — paged I/O and region-level read, write, and verify,
//! built on the byte I/O layer (D). These are the operations a CLI or
//! higher-level orchestrator actually calls; they also drive the
//! coarse-grained [`ProgressFn`] callback and delegate to a transport's
//! optional [`Programmer::paged_load`]/[`Programmer::paged_write`] fast
//! path for `"flash"`/`"eeprom"` before falling back to the byte-at-a-time
//! path.

use log::{debug, warn};

use crate::byteio;
use crate::error::{EngineError, ProgressFn};
use crate::opcode::OpKind;
use crate::part::Part;
use crate::programmer::{optional, Programmer};

/// Whether `mem_name` is one of the two regions the paged fast path
/// applies to (spec.md §4.5 step 3 of both `read_region`/`write_region`).
fn is_paged_fast_path_candidate(name: &str) -> bool {
    name == "flash" || name == "eeprom"
}

/// Fills `part.memories[mem_idx].buf[..n]` by reading `n` bytes from the
/// device, where `n = size` unless `requested_size` truncates it further.
///
/// `requested_size == 0` means "the whole memory"; otherwise `size =
/// min(requested_size, mem.size)`. Tries the transport's
/// [`Programmer::paged_load`] fast path first for `"flash"`/`"eeprom"`;
/// falls back to reading one byte at a time.
pub fn read_region<P: Programmer + ?Sized>(
    pgm: &mut P,
    part: &mut Part,
    mem_idx: usize,
    requested_size: usize,
    mut progress: Option<&mut ProgressFn>,
) -> Result<usize, EngineError> {
    let full_size = part.memories[mem_idx].size;
    let size = if requested_size == 0 { full_size } else { requested_size.min(full_size) };
    let name = part.memories[mem_idx].name.clone();

    if is_paged_fast_path_candidate(&name) {
        let mem = &part.memories[mem_idx];
        let page_size = if mem.paged { mem.page_size } else { pgm.page_size_hint() };
        // `paged_load` takes `&mut Memory`, which would alias the `&Part`
        // it also takes if borrowed straight out of `part.memories`; clone
        // it out, let the transport fill the clone, then copy the result
        // back in.
        let mut scratch = mem.clone();
        if let Some(n) = optional(pgm.paged_load(part, &mut scratch, page_size, size))? {
            part.memories[mem_idx].buf[..n].copy_from_slice(&scratch.buf[..n]);
            debug!("read_region({name}): {n} bytes via paged_load");
            return Ok(n);
        }
    }

    for i in 0..size {
        let byte = {
            let part_ro: &Part = part;
            byteio::read_byte(pgm, part_ro, &part_ro.memories[mem_idx], i)?
        };
        part.memories[mem_idx].buf[i] = byte;
        if let Some(cb) = progress.as_deref_mut() {
            cb(i + 1, size, &name);
        }
    }
    debug!("read_region({name}): {size} bytes");
    Ok(size)
}

/// Writes `part.memories[mem_idx].buf[..wsize]` to the device, where
/// `wsize = min(requested_size, mem.size)` (`requested_size == 0` means
/// "the whole memory"). Emits a truncation warning if `requested_size`
/// overshoots the memory's size.
///
/// Tries [`Programmer::paged_write`] first for `"flash"`/`"eeprom"`; falls
/// back to a byte-at-a-time loop that commits pages at page boundaries.
/// Per-byte and per-page write failures are marked *sticky*: the loop
/// keeps going so every failing address is attempted and reported, the
/// error LED is toggled once, and the first sticky error is returned after
/// the full pass completes (spec.md §4.5 step 4, §7's propagation policy).
pub fn write_region<P: Programmer + ?Sized>(
    pgm: &mut P,
    part: &Part,
    mem_idx: usize,
    requested_size: usize,
    mut progress: Option<&mut ProgressFn>,
) -> Result<usize, EngineError> {
    let mem = &part.memories[mem_idx];
    let full_size = mem.size;
    let wsize = if requested_size == 0 { full_size } else { requested_size.min(full_size) };
    if requested_size > full_size {
        warn!(
            "write_region({}): requested {} bytes but memory is only {} bytes, truncating to {}",
            mem.name, requested_size, full_size, wsize
        );
    }
    let paged = mem.paged;
    let page_size = mem.page_size;
    let name = mem.name.clone();
    let has_write_page = mem.ops.contains_key(&OpKind::WritePage);

    if is_paged_fast_path_candidate(&name) {
        let mem = &part.memories[mem_idx];
        let page_size_hint = if paged { page_size } else { pgm.page_size_hint() };
        if let Some(n) = optional(pgm.paged_write(part, mem, page_size_hint, wsize))? {
            debug!("write_region({name}): {n} bytes via paged_write");
            return Ok(n);
        }
    }

    let mut sticky: Option<EngineError> = None;

    for i in 0..wsize {
        let mem = &part.memories[mem_idx];
        let data = mem.buf[i];
        if let Err(e) = byteio::write_byte(pgm, part, mem, i, data) {
            warn!("write_region({name}): byte 0x{i:x} failed: {e}");
            sticky.get_or_insert(e);
        }

        if paged && has_write_page {
            let at_page_boundary = (i + 1) % page_size == 0;
            let at_last_byte = i + 1 == wsize;
            if at_page_boundary || at_last_byte {
                let mem = &part.memories[mem_idx];
                if let Err(e) = byteio::write_page(pgm, part, mem, i) {
                    warn!("write_region({name}): page commit at 0x{i:x} failed: {e}");
                    sticky.get_or_insert(e);
                }
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            cb(i + 1, wsize, &name);
        }
    }

    if let Some(e) = sticky {
        let _ = pgm.err_led(true);
        warn!("write_region({name}): {wsize} bytes attempted, reporting sticky error: {e}");
        return Err(e);
    }

    debug!("write_region({name}): {wsize} bytes");
    Ok(wsize)
}

/// Compares `reference`'s and `reread`'s images of `mem_name` byte by
/// byte, up to `size` bytes (or the reference memory's full size if that
/// is smaller, in which case the compare is truncated and a warning is
/// emitted). Does no device I/O: callers fill `reread` via a prior
/// [`read_region`] call on a device-side rereading of the same part.
/// Returns the number of bytes verified, or the first mismatch.
pub fn verify_region(reference: &Part, reread: &Part, mem_name: &str, size: usize) -> Result<usize, EngineError> {
    let ref_mem = reference
        .locate_memory(mem_name)
        .ok_or_else(|| EngineError::UnknownMemory(mem_name.to_string()))?;
    let reread_mem = reread
        .locate_memory(mem_name)
        .ok_or_else(|| EngineError::UnknownMemory(mem_name.to_string()))?;

    let vsize = ref_mem.size;
    let size = if vsize < size {
        warn!("verify_region({mem_name}): requested {size} bytes but reference memory is only {vsize}, truncating");
        vsize
    } else {
        size
    };

    for i in 0..size {
        let expected = ref_mem.buf[i];
        let actual = reread_mem.buf[i];
        if actual != expected {
            return Err(EngineError::VerifyMismatch { mem: mem_name.to_string(), addr: i, expected, actual });
        }
    }
    debug!("verify_region({mem_name}): {size} bytes match");
    Ok(size)
}
