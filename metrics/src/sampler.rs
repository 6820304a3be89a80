//! Counter sampler seam
//!
//! The raw hardware counter sampler is an external collaborator; the
//! aggregator only needs its report geometry and a re-readable stream of
//! report rows per sub-device.

use gpuscope_shared::{MetricKind, TypedValue};
use thiserror::Error;

/// Errors from a sampler whose advertised layout breaks the aggregation
/// contract.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("sampler reports no columns for sub-device {0}")]
    EmptyLayout(u32),

    #[error("column lists do not match report width (names {names}, kinds {kinds}, width {width})")]
    LayoutMismatch {
        names: usize,
        kinds: usize,
        width: usize,
    },

    #[error("designated column {0:?} missing from report layout")]
    MissingColumn(&'static str),
}

/// The sampler surface the aggregator consumes.
///
/// Reports for one sub-device arrive as variable-size chunks of fixed-width
/// rows; the stream is finite and restartable from the beginning.
pub trait MetricSampler: Send + Sync {
    /// Number of sub-devices the sampler collects for.
    fn sub_device_count(&self) -> u32;

    /// Columns per report row of a sub-device.
    fn report_width(&self, sub_device: u32) -> usize;

    /// Ordered column names of a sub-device's report.
    fn column_names(&self, sub_device: u32) -> Vec<String>;

    /// Ordered column kinds, parallel to [`MetricSampler::column_names`].
    fn column_kinds(&self, sub_device: u32) -> Vec<MetricKind>;

    /// Rewind the report reader to the first chunk.
    fn reset_reader(&self);

    /// Next chunk of report rows, flattened row-major. Empty when the
    /// sequence is exhausted.
    fn next_chunk(&self, sub_device: u32) -> Vec<TypedValue>;
}
