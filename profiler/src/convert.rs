//! Clock domain conversion policy
//!
//! Interval windows are recorded in the driver ecosystem's native clock
//! domain; the counter sampler stamps its reports in the device clock
//! domain. Whether those two coincide is an ecosystem property, so the
//! mapping is a pluggable policy chosen at session construction rather than
//! a fixed transform.

use gpuscope_shared::utils::time::ticks_to_ns;
use gpuscope_tracer::ClockSample;

/// Maps an interval timestamp into the clock domain the counter sampler
/// stamps its reports with.
pub trait ClockDomainConverter: Send + Sync {
    fn to_sampler_domain(&self, timestamp_ns: u64) -> u64;
}

/// For ecosystems whose native kernel timestamps already live in the
/// sampler's device domain.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl ClockDomainConverter for IdentityConverter {
    fn to_sampler_domain(&self, timestamp_ns: u64) -> u64 {
        timestamp_ns
    }
}

/// For ecosystems that report kernel timestamps in the host domain:
/// re-anchors a host-domain timestamp onto the device clock using the
/// host/device pair sampled at session start.
#[derive(Debug, Clone, Copy)]
pub struct HostAnchoredConverter {
    host_sync_ns: u64,
    device_sync_ns: u64,
}

impl HostAnchoredConverter {
    /// Build from the session's synchronized clock anchor and the device
    /// timer frequency.
    pub fn new(anchor: ClockSample, timer_frequency: u64) -> Self {
        Self {
            host_sync_ns: anchor.host_ns,
            device_sync_ns: ticks_to_ns(anchor.device_ticks, timer_frequency),
        }
    }
}

impl ClockDomainConverter for HostAnchoredConverter {
    fn to_sampler_domain(&self, timestamp_ns: u64) -> u64 {
        assert!(
            timestamp_ns > self.host_sync_ns,
            "timestamp precedes the session clock anchor"
        );
        self.device_sync_ns + (timestamp_ns - self.host_sync_ns)
    }
}
