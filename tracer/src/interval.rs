//! Execution interval construction
//!
//! Interval windows stay in the device clock domain (nanoseconds relative to
//! the device timer) so they can later be matched against hardware counter
//! reports stamped by the same clock. Expansion across sub-devices depends
//! on how the operation's target device scales: a root device with
//! sub-devices distributes work transparently (implicit scaling), so every
//! tile gets an identical window; a sub-device handle targets exactly one
//! tile.

use crate::topology::DeviceTopology;
use gpuscope_shared::DeviceHandle;
use serde::{Deserialize, Serialize};

/// Execution window on one sub-device, in device-clock-relative nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceWindow {
    pub start_ns: u64,
    pub end_ns: u64,
    /// Index of the tile within its root device's sub-device list.
    pub sub_device: u32,
}

/// Execution windows of one retired operation. Windows for one operation may
/// overlap others if the driver genuinely reported overlapping execution;
/// the list preserves what was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelInterval {
    pub name: String,
    /// Root device the operation executed on.
    pub device: DeviceHandle,
    pub windows: Vec<DeviceWindow>,
}

/// Expand one retired operation's window across the tiles it executed on.
pub(crate) fn expand_interval(
    topology: &DeviceTopology,
    name: String,
    device: DeviceHandle,
    start_ns: u64,
    end_ns: u64,
) -> KernelInterval {
    assert!(start_ns < end_ns, "interval window is empty or inverted");

    if let Some(sub_devices) = topology.sub_devices(device) {
        if !sub_devices.is_empty() {
            // Implicit scaling: per-tile timing is not separately
            // observable, so every tile shares the same window.
            let windows = (0..sub_devices.len() as u32)
                .map(|sub_device| DeviceWindow {
                    start_ns,
                    end_ns,
                    sub_device,
                })
                .collect();
            return KernelInterval {
                name,
                device,
                windows,
            };
        }
        // Root device with no tiles
        return KernelInterval {
            name,
            device,
            windows: vec![DeviceWindow {
                start_ns,
                end_ns,
                sub_device: 0,
            }],
        };
    }

    // Explicit scaling: the command list targeted a sub-device directly.
    let (root, index) = topology
        .locate_sub_device(device)
        .unwrap_or_else(|| panic!("device {device:?} is not in the topology map"));
    KernelInterval {
        name,
        device: root,
        windows: vec![DeviceWindow {
            start_ns,
            end_ns,
            sub_device: index,
        }],
    }
}
