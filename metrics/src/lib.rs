//! Hardware counter aggregation for gpuscope
//!
//! Consumes the raw report stream of an external counter sampler and reduces
//! the rows overlapping an execution window into one aggregated row, using a
//! per-column policy driven by the column's name and declared metric kind.

pub mod sampler;
pub mod window;

pub use sampler::{MetricError, MetricSampler};
pub use window::{
    aggregate_rows, aggregate_window, collect_window, ReportLayout, AVG_FREQUENCY_COLUMN,
    CLOCK_COLUMN, GPU_TIME_COLUMN, REPORT_REASON_COLUMN, TIMESTAMP_COLUMN,
};
