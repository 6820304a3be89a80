//! Profiling session
//!
//! One `Profiler` per session: it enumerates the target device, captures the
//! host/device clock anchor, wires the command collector to the optional
//! counter sampler, and exposes the read-only report surfaces an external
//! renderer consumes.

use crate::convert::{ClockDomainConverter, IdentityConverter};
use anyhow::{Context, Result};
use gpuscope_metrics::{aggregate_rows, collect_window, MetricSampler, ReportLayout};
use gpuscope_shared::{DeviceHandle, TypedValue};
use gpuscope_tracer::{
    ClockSample, CommandCollector, CompletionSink, DriverOps, HostClock, KernelInterval,
    KernelStat, TracerConfig,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Session configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProfilerConfig {
    /// Index of the target device in driver enumeration order.
    pub device_index: u32,
    /// Decorate operation names with launch shape or byte counts.
    pub verbose: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            device_index: std::env::var("GPUSCOPE_DEVICE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(0),
            verbose: std::env::var("GPUSCOPE_VERBOSE").map_or(false, |value| value == "1"),
        }
    }
}

/// Raw counter rows overlapping one interval window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRows {
    pub sub_device: u32,
    pub rows: Vec<Vec<TypedValue>>,
}

/// One aggregated counter row for one interval window. Columns whose kind
/// is excluded from aggregation are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedWindow {
    pub sub_device: u32,
    pub columns: Vec<Option<TypedValue>>,
}

/// A profiling session.
///
/// Construction enumerates devices and captures the session clock anchor;
/// `disable` stops interception; the report surfaces stay valid afterwards.
pub struct Profiler {
    collector: Arc<CommandCollector>,
    sampler: Option<Arc<dyn MetricSampler>>,
    converter: Box<dyn ClockDomainConverter>,
    device: DeviceHandle,
    sub_device_count: u32,
    clock_anchor: ClockSample,
    timer_frequency: u64,
}

impl Profiler {
    /// Build a session against the target device named by
    /// `config.device_index`.
    ///
    /// A missing sampler is a degraded session, not an error: interception
    /// and statistics still run, metric reports come back empty.
    pub fn new(
        driver: Arc<dyn DriverOps>,
        clock: Arc<dyn HostClock>,
        sampler: Option<Arc<dyn MetricSampler>>,
        config: ProfilerConfig,
    ) -> Result<Self> {
        let devices = driver.device_list();
        let device = devices
            .get(config.device_index as usize)
            .copied()
            .with_context(|| {
                format!(
                    "device index {} out of range ({} devices enumerated)",
                    config.device_index,
                    devices.len()
                )
            })?;

        let timer_frequency = driver.timer_frequency(device);
        assert!(timer_frequency > 0, "device {device:?} reports a zero timer frequency");

        let raw_anchor = driver.synchronized_timestamps(device);
        let clock_anchor = ClockSample {
            host_ns: raw_anchor.host_ns,
            device_ticks: raw_anchor.device_ticks & driver.timestamp_mask(device),
        };

        if sampler.is_none() {
            warn!("no metric sampler attached; metric reports will be empty");
        }

        let collector = Arc::new(CommandCollector::new(
            driver,
            clock,
            TracerConfig {
                verbose: config.verbose,
            },
        ));
        let sub_device_count = collector.topology().sub_device_count(device);
        info!(
            device = device.raw(),
            sub_device_count, "profiling session created"
        );

        Ok(Self {
            collector,
            sampler,
            converter: Box::new(IdentityConverter),
            device,
            sub_device_count,
            clock_anchor,
            timer_frequency,
        })
    }

    /// Replace the clock-domain conversion policy. The default is the
    /// identity mapping.
    pub fn with_converter(mut self, converter: Box<dyn ClockDomainConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Register the sink notified once per retired call.
    pub fn set_completion_sink(&self, sink: Box<dyn CompletionSink>) {
        self.collector.set_completion_sink(sink);
    }

    /// The hook surface the driver shim feeds.
    pub fn collector(&self) -> &Arc<CommandCollector> {
        &self.collector
    }

    pub fn enable(&self) {
        self.collector.enable();
    }

    pub fn disable(&self) {
        self.collector.disable();
    }

    /// The session's target device.
    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    /// Separately observable tiles of the target device (at least 1).
    pub fn sub_device_count(&self) -> u32 {
        self.sub_device_count
    }

    /// Host/device clock pair captured at construction, device side masked.
    pub fn clock_anchor(&self) -> ClockSample {
        self.clock_anchor
    }

    /// Target device timer frequency in ticks per second.
    pub fn timer_frequency(&self) -> u64 {
        self.timer_frequency
    }

    /// Ranked per-operation statistics, across all devices.
    pub fn kernel_report(&self) -> Vec<(String, KernelStat)> {
        self.collector.kernel_stats()
    }

    /// Intervals of the target device, windows in the native clock domain.
    pub fn interval_report(&self) -> Vec<KernelInterval> {
        self.collector
            .kernel_intervals()
            .into_iter()
            .filter(|interval| interval.device == self.device)
            .collect()
    }

    /// Raw counter rows overlapping each window of one interval. Empty when
    /// no sampler is attached.
    pub fn metric_report(&self, interval: &KernelInterval) -> Result<Vec<WindowRows>> {
        let Some(sampler) = &self.sampler else {
            return Ok(Vec::new());
        };

        let mut report = Vec::with_capacity(interval.windows.len());
        for window in &interval.windows {
            let layout = ReportLayout::from_sampler(sampler.as_ref(), window.sub_device)
                .context("unusable sampler report layout")?;
            let start = self.converter.to_sampler_domain(window.start_ns);
            let end = self.converter.to_sampler_domain(window.end_ns);
            let rows = collect_window(sampler.as_ref(), window.sub_device, &layout, start, end);
            report.push(WindowRows {
                sub_device: window.sub_device,
                rows,
            });
        }
        Ok(report)
    }

    /// One aggregated counter row per window of one interval; windows with
    /// no overlapping reports are omitted. Empty when no sampler is
    /// attached.
    pub fn aggregated_report(&self, interval: &KernelInterval) -> Result<Vec<AggregatedWindow>> {
        let Some(sampler) = &self.sampler else {
            return Ok(Vec::new());
        };

        let mut report = Vec::new();
        for window in &interval.windows {
            let layout = ReportLayout::from_sampler(sampler.as_ref(), window.sub_device)
                .context("unusable sampler report layout")?;
            let start = self.converter.to_sampler_domain(window.start_ns);
            let end = self.converter.to_sampler_domain(window.end_ns);
            let rows = collect_window(sampler.as_ref(), window.sub_device, &layout, start, end);
            if let Some(columns) = aggregate_rows(&layout, &rows) {
                report.push(AggregatedWindow {
                    sub_device: window.sub_device,
                    columns,
                });
            }
        }
        Ok(report)
    }
}
