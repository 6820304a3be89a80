//! Profiling session layer for gpuscope
//!
//! Binds the interception/correlation core to the metric window aggregator:
//! one [`Profiler`] per profiling session, with an explicit
//! construct/enable/disable lifecycle and read-only report surfaces for an
//! external renderer.

pub mod convert;
pub mod session;

pub use convert::{ClockDomainConverter, HostAnchoredConverter, IdentityConverter};
pub use session::{AggregatedWindow, Profiler, ProfilerConfig, WindowRows};
