//! Interception payloads
//!
//! One [`AppendRequest`] variant per traced command-append entry point. The
//! shim builds the variant from the intercepted call's arguments; the
//! collector normalizes every variant into the common [`CommandInfo`] shape,
//! resolving group geometry and image sizes from its side tables. Keeping
//! the table of operations as an enum keeps the hot path a single match,
//! with no dispatch through function pointers.

use crate::command::{CommandInfo, CommandRecord};
use crate::registry::TraceState;
use gpuscope_shared::{CommandListHandle, ImageHandle, KernelHandle, QueueHandle, SignalHandle};

/// Driver-reported outcome of an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Typed payload of one command-append entry point.
#[derive(Debug, Clone)]
pub enum AppendRequest<'a> {
    LaunchKernel {
        kernel: KernelHandle,
        name: &'a str,
        simd_width: u32,
        group_count: [u32; 3],
    },
    LaunchCooperativeKernel {
        kernel: KernelHandle,
        name: &'a str,
        simd_width: u32,
        group_count: [u32; 3],
    },
    /// Indirect launches read their group count on the device; only the
    /// kernel identity is known at append time.
    LaunchKernelIndirect {
        kernel: KernelHandle,
        name: &'a str,
        simd_width: u32,
    },
    MemoryCopy {
        bytes: u64,
    },
    MemoryFill {
        bytes: u64,
    },
    MemoryCopyRegion {
        width: u64,
        height: u64,
        depth: u64,
        pitch: u64,
    },
    MemoryCopyFromContext {
        bytes: u64,
    },
    Barrier,
    MemoryRangesBarrier,
    ImageCopy {
        src: ImageHandle,
    },
    ImageCopyRegion {
        src: ImageHandle,
    },
    ImageCopyToMemory {
        src: ImageHandle,
    },
    ImageCopyFromMemory {
        width: u64,
        height: u64,
        depth: u64,
    },
}

impl AppendRequest<'_> {
    /// Entry-point name, used as the semantic name of operations that have
    /// no kernel identity of their own.
    pub fn api_name(&self) -> &'static str {
        match self {
            AppendRequest::LaunchKernel { .. } => "CommandListAppendLaunchKernel",
            AppendRequest::LaunchCooperativeKernel { .. } => {
                "CommandListAppendLaunchCooperativeKernel"
            }
            AppendRequest::LaunchKernelIndirect { .. } => "CommandListAppendLaunchKernelIndirect",
            AppendRequest::MemoryCopy { .. } => "CommandListAppendMemoryCopy",
            AppendRequest::MemoryFill { .. } => "CommandListAppendMemoryFill",
            AppendRequest::MemoryCopyRegion { .. } => "CommandListAppendMemoryCopyRegion",
            AppendRequest::MemoryCopyFromContext { .. } => "CommandListAppendMemoryCopyFromContext",
            AppendRequest::Barrier => "CommandListAppendBarrier",
            AppendRequest::MemoryRangesBarrier => "CommandListAppendMemoryRangesBarrier",
            AppendRequest::ImageCopy { .. } => "CommandListAppendImageCopy",
            AppendRequest::ImageCopyRegion { .. } => "CommandListAppendImageCopyRegion",
            AppendRequest::ImageCopyToMemory { .. } => "CommandListAppendImageCopyToMemory",
            AppendRequest::ImageCopyFromMemory { .. } => "CommandListAppendImageCopyFromMemory",
        }
    }

    /// Normalize the raw call arguments into the common command shape,
    /// resolving group geometry and image byte sizes from the side tables.
    pub(crate) fn normalize(&self, state: &TraceState) -> CommandInfo {
        match *self {
            AppendRequest::LaunchKernel {
                kernel,
                name,
                simd_width,
                group_count,
            }
            | AppendRequest::LaunchCooperativeKernel {
                kernel,
                name,
                simd_width,
                group_count,
            } => {
                let group_size = state.group_sizes.get(&kernel).copied().unwrap_or([0; 3]);
                CommandInfo::kernel(name, simd_width, group_count, group_size)
            }
            AppendRequest::LaunchKernelIndirect {
                kernel,
                name,
                simd_width,
            } => {
                let group_size = state.group_sizes.get(&kernel).copied().unwrap_or([0; 3]);
                CommandInfo::kernel(name, simd_width, [0; 3], group_size)
            }
            AppendRequest::MemoryCopy { bytes }
            | AppendRequest::MemoryFill { bytes }
            | AppendRequest::MemoryCopyFromContext { bytes } => {
                CommandInfo::transfer(self.api_name(), bytes)
            }
            AppendRequest::MemoryCopyRegion {
                width,
                height,
                depth,
                pitch,
            } => {
                let mut bytes = width * height * pitch;
                if depth != 0 {
                    bytes *= depth;
                }
                CommandInfo::transfer(self.api_name(), bytes)
            }
            AppendRequest::Barrier | AppendRequest::MemoryRangesBarrier => {
                CommandInfo::transfer(self.api_name(), 0)
            }
            AppendRequest::ImageCopy { src }
            | AppendRequest::ImageCopyRegion { src }
            | AppendRequest::ImageCopyToMemory { src } => {
                // Unknown images transfer an unknown amount; zero keeps the
                // name undecorated rather than guessing.
                let bytes = state.image_sizes.get(&src).copied().unwrap_or(0);
                CommandInfo::transfer(self.api_name(), bytes)
            }
            AppendRequest::ImageCopyFromMemory {
                width,
                height,
                depth,
            } => {
                let mut bytes = width * height;
                if depth != 0 {
                    bytes *= depth;
                }
                CommandInfo::transfer(self.api_name(), bytes)
            }
        }
    }
}

/// Submission anchor seeded at append time for immediate lists.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSeed {
    pub queue: QueueHandle,
    pub submit_ns: u64,
    pub device_submit_ticks: u64,
}

/// Candidate command carried between the enter and exit phases of an
/// append call.
///
/// The shim must pass [`PendingAppend::signal`] to the driver as the call's
/// completion signal when the application did not supply one of its own.
#[derive(Debug)]
pub struct PendingAppend {
    pub(crate) list: CommandListHandle,
    pub(crate) command: CommandRecord,
    pub(crate) seed: Option<CallSeed>,
}

impl PendingAppend {
    /// The completion signal attached to this operation.
    pub fn signal(&self) -> SignalHandle {
        self.command.signal
    }
}

/// Host/device anchor pairs captured on entry to a queue-execute call, one
/// per submitted list. Every call manufactured from one list shares that
/// list's pair.
#[derive(Debug)]
pub struct SubmitBatch {
    pub(crate) anchors: Vec<SubmitAnchor>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SubmitAnchor {
    pub host_ns: u64,
    pub device_ticks: u64,
}
