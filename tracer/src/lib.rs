//! GPU command interception and correlation core
//!
//! This crate turns intercepted driver calls into durable command/call
//! records, resolves asynchronous device completion into host-wall-clock
//! windows, and maintains per-operation statistics and per-sub-device
//! execution intervals. It is driven synchronously from whatever application
//! thread makes the intercepted call; there is no background thread.

pub mod clock;
pub mod collector;
pub mod command;
pub mod driver;
pub mod intercept;
pub mod interval;
pub mod registry;
pub mod stats;
pub mod topology;

pub use clock::{HostClock, MonotonicClock};
pub use collector::{CommandCollector, CompletionSink, TracerConfig};
pub use command::{CallRecord, CommandInfo, CommandRecord, SignalOwnership};
pub use driver::{ClockSample, DeviceTimestamps, DriverError, DriverOps};
pub use intercept::{AppendRequest, CallOutcome, PendingAppend, SubmitBatch};
pub use interval::{DeviceWindow, KernelInterval};
pub use registry::CommandListRecord;
pub use stats::{KernelStat, KernelStatMap};
pub use topology::DeviceTopology;
