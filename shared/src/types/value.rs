//! Typed hardware counter values
//!
//! Counter reports are rows of heterogeneously typed columns. Each value
//! carries its own type tag so aggregation can pick exact arithmetic per
//! column instead of coercing everything through one numeric type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One typed value inside a counter report row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    B8(bool),
}

impl TypedValue {
    /// The value as `u32`, if it is one.
    pub fn as_u32(self) -> Option<u32> {
        match self {
            TypedValue::U32(v) => Some(v),
            _ => None,
        }
    }

    /// The value as `u64`, if it is one.
    pub fn as_u64(self) -> Option<u64> {
        match self {
            TypedValue::U64(v) => Some(v),
            _ => None,
        }
    }

    /// The value as `f32`, if it is one.
    pub fn as_f32(self) -> Option<f32> {
        match self {
            TypedValue::F32(v) => Some(v),
            _ => None,
        }
    }

    /// The value as `f64`, if it is one.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            TypedValue::F64(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::U32(v) => write!(f, "{v}"),
            TypedValue::U64(v) => write!(f, "{v}"),
            TypedValue::F32(v) => write!(f, "{v}"),
            TypedValue::F64(v) => write!(f, "{v}"),
            // Booleans render as 0/1 like any other counter column
            TypedValue::B8(v) => write!(f, "{}", u32::from(*v)),
        }
    }
}

/// Semantic kind of a counter column, declared by the sampler.
///
/// The kind determines how a column is reduced when many report rows are
/// collapsed into one aggregated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Duration,
    Event,
    EventWithRange,
    Throughput,
    Timestamp,
    Flag,
    Ratio,
    Raw,
}
