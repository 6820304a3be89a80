//! Event type definitions for trace data
//!
//! These types carry completed-operation timing out of the tracer core to
//! whatever reporting sink the embedding application registered.

use crate::types::handles::QueueHandle;
use serde::{Deserialize, Serialize};

/// Host timestamp in nanoseconds, relative to profiling start.
pub type TimestampNs = u64;

/// Monotonically increasing identifier of a committed command.
pub type CommandId = u64;

/// Notification payload for one retired call.
///
/// All four timestamps are host nanoseconds on the same timeline:
/// `append_ns <= submit_ns <= start_ns <= end_ns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Identifier of the command this call executed.
    pub command_id: CommandId,

    /// Sequence number of this call within its command (starting at 1).
    pub call_id: u64,

    /// Queue the call was submitted to.
    pub queue: QueueHandle,

    /// Display name of the operation.
    pub name: String,

    /// When the operation was appended to its command list.
    pub append_ns: TimestampNs,

    /// When the command list was submitted for execution.
    pub submit_ns: TimestampNs,

    /// When the device started executing the operation.
    pub start_ns: TimestampNs,

    /// When the device finished executing the operation.
    pub end_ns: TimestampNs,
}

impl CompletionEvent {
    /// Correlation id in `<command>.<call>` form, unique per retired call.
    pub fn correlation_id(&self) -> String {
        format!("{}.{}", self.command_id, self.call_id)
    }

    /// Device execution time of this call.
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}
