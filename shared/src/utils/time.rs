//! Time-related utilities

use std::sync::OnceLock;
use std::time::Instant;

/// Nanoseconds per second.
pub const NSEC_IN_SEC: u64 = 1_000_000_000;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since the first call in this process.
///
/// All host timestamps recorded by the tracer are on this timeline, so the
/// first caller anchors time zero for the whole profiling session.
pub fn monotonic_ns() -> u64 {
    PROCESS_START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Convert device timer ticks to nanoseconds at the given tick frequency.
///
/// The intermediate product is widened to 128 bits so tick counts near the
/// timer mask cannot overflow.
pub fn ticks_to_ns(ticks: u64, frequency: u64) -> u64 {
    assert!(frequency > 0, "device timer frequency must be non-zero");
    (ticks as u128 * NSEC_IN_SEC as u128 / frequency as u128) as u64
}
