//! Host clock services.
//!
//! Timer expiries and the RTC device are expressed in host microseconds from
//! a process-wide epoch captured on first use. A monotonic source is used so
//! wall-clock adjustments cannot run timers backwards.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns monotonic host time in microseconds since the process epoch.
///
/// The epoch is captured the first time any caller asks for the time, so
/// early values are small. Only differences between two readings are
/// meaningful.
pub fn time_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}
