//! Driver seam
//!
//! The tracer never talks to a GPU driver directly. The embedding shim, which
//! owns the actual API interception, implements [`DriverOps`] and the tracer
//! issues the handful of driver calls it needs (clock queries, completion
//! signal management) through it. Completion polling is non-blocking; the
//! tracer has no call that waits on hardware.

use gpuscope_shared::{ContextHandle, DeviceHandle, SignalHandle};
use thiserror::Error;

/// Errors from driver calls the tracer itself issues.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("signal allocation failed: {0}")]
    SignalCreate(String),

    #[error("signal destruction failed: {0}")]
    SignalDestroy(String),

    #[error("signal {0:?} has no completed timestamps")]
    TimestampsUnavailable(SignalHandle),
}

/// Device-side start/end of a completed operation, in raw timer ticks.
///
/// The device timer is narrower than 64 bits; callers must assume at most one
/// wraparound between `start_ticks` and `end_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimestamps {
    pub start_ticks: u64,
    pub end_ticks: u64,
}

/// Host and device clocks sampled at the same instant.
///
/// Captured once at profiling start and used to re-anchor timestamps across
/// clock domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    /// Host monotonic nanoseconds.
    pub host_ns: u64,
    /// Device timer value in raw ticks.
    pub device_ticks: u64,
}

/// The driver surface the tracer consumes.
pub trait DriverOps: Send + Sync {
    /// Root devices, in enumeration order.
    fn device_list(&self) -> Vec<DeviceHandle>;

    /// Sub-devices of a root device, in enumeration order. Empty for devices
    /// that do not expose tiles separately.
    fn sub_device_list(&self, device: DeviceHandle) -> Vec<DeviceHandle>;

    /// Device timer frequency in ticks per second.
    fn timer_frequency(&self, device: DeviceHandle) -> u64;

    /// Mask of valid bits in the device timer. Raw timer reads must be
    /// masked before use.
    fn timestamp_mask(&self, device: DeviceHandle) -> u64;

    /// Current raw (unmasked) device timer value.
    fn device_timestamp(&self, device: DeviceHandle) -> u64;

    /// Host and device clocks sampled together, for domain anchoring.
    fn synchronized_timestamps(&self, device: DeviceHandle) -> ClockSample;

    /// Create a host-visible completion signal on the given context.
    fn create_signal(&self, context: ContextHandle) -> Result<SignalHandle, DriverError>;

    /// Destroy a signal previously created through [`DriverOps::create_signal`].
    fn destroy_signal(&self, signal: SignalHandle) -> Result<(), DriverError>;

    /// Non-blocking completion poll.
    fn signal_complete(&self, signal: SignalHandle) -> bool;

    /// Device start/end ticks of the operation that signaled completion.
    /// Only meaningful once [`DriverOps::signal_complete`] has returned true.
    fn signal_timestamps(&self, signal: SignalHandle) -> Result<DeviceTimestamps, DriverError>;
}
