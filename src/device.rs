//! RDMA device model
//!
//! An [`RdmaDevice`] is built fresh by every discovery call and handed to the
//! CDI generator or the doctor. Nothing in here touches the host.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RdmaCdiError, Result};

/// RDMA character device types that must all be present for a device to be usable
pub const REQUIRED_RDMA_DEVICES: [&str; 3] = ["rdma_cm", "umad", "uverbs"];

/// Permissions granted on every exposed device node
pub const DEFAULT_PERMISSIONS: &str = "rw";

/// A host device file exposed inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Path on the host (e.g. `/dev/infiniband/uverbs0`)
    pub host_path: String,
    /// Path inside the container, always equal to `host_path`
    pub container_path: String,
    /// Cgroup permissions (e.g. `rw`)
    pub permissions: String,
}

impl DeviceNode {
    /// Expose `path` at the same location inside the container
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            container_path: path.clone(),
            host_path: path,
            permissions: DEFAULT_PERMISSIONS.to_string(),
        }
    }
}

/// One RDMA-capable PCI function and its character devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeviceRecord")]
pub struct RdmaDevice {
    /// PCI BDF address (e.g. `0000:17:00.0`)
    pub pci_address: String,
    /// Network interface name, if the function has one
    #[serde(rename = "interface", skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    /// PCI vendor ID without the `0x` prefix (e.g. `15b3`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    /// PCI device ID without the `0x` prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Bound kernel driver (e.g. `mlx5_core`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Link encapsulation type (e.g. `infiniband`, `ether`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    /// RDMA character device paths in resolver order
    #[serde(rename = "rdma_devices")]
    pub char_device_paths: Vec<String>,
    /// Device nodes derived 1:1 from `char_device_paths`
    #[serde(skip)]
    pub device_nodes: Vec<DeviceNode>,
}

/// Serialized form of [`RdmaDevice`]; device nodes are rebuilt on load
#[derive(Deserialize)]
struct DeviceRecord {
    pci_address: String,
    #[serde(rename = "interface", default)]
    interface_name: Option<String>,
    #[serde(default)]
    vendor_id: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    link_type: Option<String>,
    #[serde(rename = "rdma_devices", default)]
    char_device_paths: Vec<String>,
}

impl From<DeviceRecord> for RdmaDevice {
    fn from(record: DeviceRecord) -> Self {
        Self {
            interface_name: record.interface_name,
            vendor_id: record.vendor_id,
            device_id: record.device_id,
            driver: record.driver,
            link_type: record.link_type,
            ..Self::new(record.pci_address, record.char_device_paths)
        }
    }
}

impl RdmaDevice {
    /// Create a bare record for `pci_address` with the given character devices.
    ///
    /// Device nodes are derived from the paths; every optional attribute starts
    /// out empty.
    pub fn new(pci_address: impl Into<String>, char_device_paths: Vec<String>) -> Self {
        Self {
            pci_address: pci_address.into(),
            interface_name: None,
            vendor_id: None,
            device_id: None,
            driver: None,
            link_type: None,
            device_nodes: build_device_nodes(&char_device_paths),
            char_device_paths,
        }
    }

    /// Set the interface name
    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interface_name = Some(name.into());
        self
    }

    /// Check the required RDMA device types against this record
    pub fn verify(&self) -> Result<()> {
        verify_rdma_devices(&self.char_device_paths)
    }

    /// True when all required RDMA device types are present
    pub fn is_usable(&self) -> bool {
        self.verify().is_ok()
    }
}

/// Convert character device paths into device nodes
pub fn build_device_nodes<S: AsRef<str>>(char_devices: &[S]) -> Vec<DeviceNode> {
    char_devices
        .iter()
        .map(|dev| DeviceNode::new(dev.as_ref()))
        .collect()
}

/// Check that every required RDMA device type appears in `char_devices`.
///
/// Matching is a substring test against the base name of each path, so
/// `umad0` and `umad1` both satisfy `umad`. Order and duplicates don't matter.
pub fn verify_rdma_devices<S: AsRef<str>>(char_devices: &[S]) -> Result<()> {
    for required in REQUIRED_RDMA_DEVICES {
        let found = char_devices.iter().any(|dev| {
            Path::new(dev.as_ref())
                .file_name()
                .map(|name| name.to_string_lossy().contains(required))
                .unwrap_or(false)
        });
        if !found {
            return Err(RdmaCdiError::Validation(format!(
                "required RDMA device type {required:?} not found"
            )));
        }
    }
    Ok(())
}
