//! Metric window extraction and reduction
//!
//! Given an execution window in the sampler's clock domain, extract every
//! report row whose timestamp falls inside it and reduce the rows into one
//! aggregated row. Reduction policy is chosen per column: a few columns are
//! designated by name, the rest follow their declared metric kind.

use crate::sampler::{MetricError, MetricSampler};
use gpuscope_shared::{MetricKind, TypedValue};
use tracing::debug;

/// Column carrying the report's device-domain timestamp.
pub const TIMESTAMP_COLUMN: &str = "QueryBeginTime";
/// Column carrying the clock count used as the weighted-average weight.
pub const CLOCK_COLUMN: &str = "GpuCoreClocks";
/// Elapsed-GPU-time column: summed regardless of its declared kind.
pub const GPU_TIME_COLUMN: &str = "GpuTime";
/// Average-frequency column: weighted-averaged regardless of declared kind.
pub const AVG_FREQUENCY_COLUMN: &str = "AvgGpuCoreFrequencyMHz";
/// Report-reason column: passed through from the first collected row.
pub const REPORT_REASON_COLUMN: &str = "ReportReason";

/// Resolved column layout of one sub-device's report stream.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub names: Vec<String>,
    pub kinds: Vec<MetricKind>,
    pub width: usize,
    /// Index of [`TIMESTAMP_COLUMN`].
    pub time_column: usize,
    /// Index of [`CLOCK_COLUMN`].
    pub clock_column: usize,
}

impl ReportLayout {
    /// Resolve the layout a sampler advertises for one sub-device.
    pub fn from_sampler(sampler: &dyn MetricSampler, sub_device: u32) -> Result<Self, MetricError> {
        let width = sampler.report_width(sub_device);
        let names = sampler.column_names(sub_device);
        let kinds = sampler.column_kinds(sub_device);
        if width == 0 || names.is_empty() {
            return Err(MetricError::EmptyLayout(sub_device));
        }
        if names.len() != width || kinds.len() != width {
            return Err(MetricError::LayoutMismatch {
                names: names.len(),
                kinds: kinds.len(),
                width,
            });
        }
        let time_column = names
            .iter()
            .position(|name| name == TIMESTAMP_COLUMN)
            .ok_or(MetricError::MissingColumn(TIMESTAMP_COLUMN))?;
        let clock_column = names
            .iter()
            .position(|name| name == CLOCK_COLUMN)
            .ok_or(MetricError::MissingColumn(CLOCK_COLUMN))?;
        Ok(Self {
            names,
            kinds,
            width,
            time_column,
            clock_column,
        })
    }
}

fn row_timestamp(row: &[TypedValue], layout: &ReportLayout) -> u64 {
    row[layout.time_column]
        .as_u64()
        .expect("timestamp column must be a 64-bit value")
}

/// Collect every report row whose timestamp lies inside `[start, end]`
/// (inclusive at both ends).
///
/// A chunk is skipped whole when its first row is already past the window
/// or its last row has not reached it yet.
pub fn collect_window(
    sampler: &dyn MetricSampler,
    sub_device: u32,
    layout: &ReportLayout,
    start: u64,
    end: u64,
) -> Vec<Vec<TypedValue>> {
    assert!(start < end, "metric window is empty or inverted");

    let width = layout.width;
    let mut rows = Vec::new();
    sampler.reset_reader();
    loop {
        let chunk = sampler.next_chunk(sub_device);
        if chunk.is_empty() {
            break;
        }
        assert!(
            chunk.len() % width == 0,
            "report chunk is not a whole number of rows"
        );
        let count = chunk.len() / width;

        let first = row_timestamp(&chunk[..width], layout);
        if first > end {
            continue;
        }
        let last = row_timestamp(&chunk[(count - 1) * width..], layout);
        if last < start {
            continue;
        }

        for index in 0..count {
            let row = &chunk[index * width..(index + 1) * width];
            let timestamp = row_timestamp(row, layout);
            if timestamp >= start && timestamp <= end {
                rows.push(row.to_vec());
            }
        }
    }
    debug!(sub_device, rows = rows.len(), "collected metric window");
    rows
}

/// Extract and reduce one window. `None` when no report rows overlap it.
pub fn aggregate_window(
    sampler: &dyn MetricSampler,
    sub_device: u32,
    layout: &ReportLayout,
    start: u64,
    end: u64,
) -> Option<Vec<Option<TypedValue>>> {
    let rows = collect_window(sampler, sub_device, layout, start, end);
    aggregate_rows(layout, &rows)
}

/// Reduce collected rows into one aggregated row.
///
/// Columns whose kind carries no meaningful aggregate (event-with-range,
/// flag) are left as `None`; every other column is reduced per the policy
/// table. `None` when `rows` is empty.
pub fn aggregate_rows(
    layout: &ReportLayout,
    rows: &[Vec<TypedValue>],
) -> Option<Vec<Option<TypedValue>>> {
    if rows.is_empty() {
        return None;
    }

    let total_clocks: u64 = rows
        .iter()
        .map(|row| {
            row[layout.clock_column]
                .as_u64()
                .expect("clock count column must be a 64-bit value")
        })
        .sum();

    let mut aggregated = Vec::with_capacity(layout.width);
    for column in 0..layout.width {
        let name = layout.names[column].as_str();
        let value = if name == GPU_TIME_COLUMN {
            Some(column_total(rows, column))
        } else if name == AVG_FREQUENCY_COLUMN {
            Some(weighted_average(rows, column, layout.clock_column, total_clocks))
        } else if name == REPORT_REASON_COLUMN {
            Some(rows[0][column])
        } else {
            match layout.kinds[column] {
                MetricKind::Duration | MetricKind::Ratio => {
                    Some(weighted_average(rows, column, layout.clock_column, total_clocks))
                }
                MetricKind::Throughput | MetricKind::Event => Some(column_total(rows, column)),
                MetricKind::Timestamp | MetricKind::Raw => Some(rows[0][column]),
                MetricKind::EventWithRange | MetricKind::Flag => None,
            }
        };
        aggregated.push(value);
    }
    Some(aggregated)
}

/// Clock-weighted average of one column. Integer columns accumulate into a
/// 64-bit unsigned total of `value * weight` and divide truncating; float
/// columns accumulate into a 64-bit float.
fn weighted_average(
    rows: &[Vec<TypedValue>],
    column: usize,
    clock_column: usize,
    total_clocks: u64,
) -> TypedValue {
    assert!(total_clocks > 0, "zero clock weight over a non-empty window");

    let weight = |row: &[TypedValue]| -> u64 {
        row[clock_column]
            .as_u64()
            .expect("clock count column must be a 64-bit value")
    };

    match rows[0][column] {
        TypedValue::U32(_) => {
            let mut total: u64 = 0;
            for row in rows {
                let value = row[column].as_u32().expect("column type changed mid-stream");
                total += u64::from(value) * weight(row);
            }
            TypedValue::U64(total / total_clocks)
        }
        TypedValue::U64(_) => {
            let mut total: u64 = 0;
            for row in rows {
                let value = row[column].as_u64().expect("column type changed mid-stream");
                total += value * weight(row);
            }
            TypedValue::U64(total / total_clocks)
        }
        TypedValue::F32(_) => {
            let mut total: f64 = 0.0;
            for row in rows {
                let value = row[column].as_f32().expect("column type changed mid-stream");
                total += f64::from(value) * weight(row) as f64;
            }
            TypedValue::F64(total / total_clocks as f64)
        }
        TypedValue::F64(_) => {
            let mut total: f64 = 0.0;
            for row in rows {
                let value = row[column].as_f64().expect("column type changed mid-stream");
                total += value * weight(row) as f64;
            }
            TypedValue::F64(total / total_clocks as f64)
        }
        TypedValue::B8(_) => panic!("boolean column cannot be averaged"),
    }
}

/// Sum of one column across all rows, widened to 64 bits.
fn column_total(rows: &[Vec<TypedValue>], column: usize) -> TypedValue {
    match rows[0][column] {
        TypedValue::U32(_) => {
            let mut total: u64 = 0;
            for row in rows {
                total += u64::from(row[column].as_u32().expect("column type changed mid-stream"));
            }
            TypedValue::U64(total)
        }
        TypedValue::U64(_) => {
            let mut total: u64 = 0;
            for row in rows {
                total += row[column].as_u64().expect("column type changed mid-stream");
            }
            TypedValue::U64(total)
        }
        TypedValue::F32(_) => {
            let mut total: f64 = 0.0;
            for row in rows {
                total += f64::from(row[column].as_f32().expect("column type changed mid-stream"));
            }
            TypedValue::F64(total)
        }
        TypedValue::F64(_) => {
            let mut total: f64 = 0.0;
            for row in rows {
                total += row[column].as_f64().expect("column type changed mid-stream");
            }
            TypedValue::F64(total)
        }
        TypedValue::B8(_) => panic!("boolean column cannot be summed"),
    }
}
