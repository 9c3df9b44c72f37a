//! The single monotonic wait primitive the engine uses for write delays,
//! chip-erase delay, power-cycle delay, and initialization pulses. Exact
//! microsecond-level accuracy is not required (spec.md §5): these are
//! conservative upper bounds, not real-time deadlines.

use std::time::Duration;

/// Blocks the calling thread for `us` microseconds.
pub fn sleep_us(us: u64) {
    if us > 0 {
        std::thread::sleep(Duration::from_micros(us));
    }
}

/// Blocks the calling thread for `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    sleep_us(ms * 1000);
}
