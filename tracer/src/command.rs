//! Command and call records
//!
//! A `CommandRecord` is the durable identity of one accepted device
//! operation; a `CallRecord` is one submission instance of it, pending until
//! completion is observed.

use gpuscope_shared::{CommandId, CommandListHandle, DeviceHandle, QueueHandle, SignalHandle};
use serde::{Deserialize, Serialize};

/// Shape metadata of an appended operation.
///
/// Kernel launches carry a SIMD width and group geometry; transfers carry a
/// byte count. Zero means "not applicable" for all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    pub simd_width: u32,
    pub bytes_transferred: u64,
    pub group_count: [u32; 3],
    pub group_size: [u32; 3],
}

impl CommandInfo {
    /// Metadata for a kernel launch.
    pub fn kernel(name: &str, simd_width: u32, group_count: [u32; 3], group_size: [u32; 3]) -> Self {
        Self {
            name: name.to_string(),
            simd_width,
            bytes_transferred: 0,
            group_count,
            group_size,
        }
    }

    /// Metadata for a transfer, fill or barrier named after its entry point.
    pub fn transfer(name: &str, bytes_transferred: u64) -> Self {
        Self {
            name: name.to_string(),
            bytes_transferred,
            ..Self::default()
        }
    }

    /// Display name used for statistics and intervals.
    ///
    /// With `verbose` set, kernel launches are decorated with their SIMD
    /// width and group geometry, transfers with their byte count.
    pub fn display_name(&self, verbose: bool) -> String {
        if !verbose {
            return self.name.clone();
        }
        if self.simd_width > 0 {
            format!(
                "{}[SIMD{} {{{}; {}; {}}} {{{}; {}; {}}}]",
                self.name,
                self.simd_width,
                self.group_count[0],
                self.group_count[1],
                self.group_count[2],
                self.group_size[0],
                self.group_size[1],
                self.group_size[2],
            )
        } else if self.bytes_transferred > 0 {
            format!("{}[{} bytes]", self.name, self.bytes_transferred)
        } else {
            self.name.clone()
        }
    }
}

/// Who is responsible for destroying a command's completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOwnership {
    /// The tracer created the signal and must destroy it when the command
    /// is released.
    Owned,
    /// The application supplied the signal; the tracer never destroys it.
    Borrowed,
}

/// Durable record of one accepted device operation.
#[derive(Debug)]
pub struct CommandRecord {
    pub info: CommandInfo,
    pub signal: SignalHandle,
    pub ownership: SignalOwnership,
    pub list: CommandListHandle,
    pub device: DeviceHandle,
    /// Assigned at commit time, starting from 1. Zero while the command is
    /// still a candidate between the enter and exit phases of an append.
    pub id: CommandId,
    pub append_ns: u64,
    /// Device timer frequency captured at append time.
    pub timer_frequency: u64,
    /// Number of calls created from this command so far.
    pub call_count: u64,
}

/// One submission instance of a command.
///
/// The submission timestamps are shared by every command submitted in the
/// same batch; `call_id` is the command's call counter at submission.
#[derive(Debug)]
pub struct CallRecord {
    pub command_id: CommandId,
    pub queue: QueueHandle,
    /// Host timestamp at submission.
    pub submit_ns: u64,
    /// Masked device timer value at submission.
    pub device_submit_ticks: u64,
    pub call_id: u64,
}
