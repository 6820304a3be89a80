//! Device topology map
//!
//! Enumerated once at collector construction and immutable afterward. The
//! map distinguishes implicit scaling (a root device transparently spanning
//! its sub-devices) from explicit scaling (the application submitting to
//! sub-device handles directly), which drives interval expansion at
//! retirement.

use crate::driver::DriverOps;
use gpuscope_shared::DeviceHandle;
use std::collections::BTreeMap;

/// Root device handle -> ordered sub-device handles (empty if none).
#[derive(Debug, Clone, Default)]
pub struct DeviceTopology {
    devices: BTreeMap<DeviceHandle, Vec<DeviceHandle>>,
}

impl DeviceTopology {
    /// Enumerate all root devices and their sub-devices.
    pub fn discover(driver: &dyn DriverOps) -> Self {
        let mut devices = BTreeMap::new();
        for device in driver.device_list() {
            let sub_devices = driver.sub_device_list(device);
            let previous = devices.insert(device, sub_devices);
            assert!(previous.is_none(), "device enumerated twice: {device:?}");
        }
        Self { devices }
    }

    /// Number of known root devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Sub-device list of a root device, or `None` if `device` is not a
    /// root device (it may still be a sub-device of one).
    pub fn sub_devices(&self, device: DeviceHandle) -> Option<&[DeviceHandle]> {
        self.devices.get(&device).map(Vec::as_slice)
    }

    /// Locate a sub-device handle: the root device owning it and its index
    /// within that root's sub-device list.
    pub fn locate_sub_device(&self, handle: DeviceHandle) -> Option<(DeviceHandle, u32)> {
        for (root, sub_devices) in &self.devices {
            if let Some(index) = sub_devices.iter().position(|&sub| sub == handle) {
                return Some((*root, index as u32));
            }
        }
        None
    }

    /// Number of separately observable tiles of a root device (at least 1).
    pub fn sub_device_count(&self, device: DeviceHandle) -> u32 {
        match self.devices.get(&device) {
            Some(sub_devices) if !sub_devices.is_empty() => sub_devices.len() as u32,
            _ => 1,
        }
    }
}
