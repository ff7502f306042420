//! Mapping from PCI functions to RDMA character devices

use std::path::Path;

use log::debug;

use super::sysfs::{list_dir, read_trimmed};
use super::HostPaths;

/// Resolves the RDMA character devices that belong to a PCI function
#[cfg_attr(test, mockall::automock)]
pub trait RdmaResolver {
    /// Character device paths for `pci_address`, empty if it is not an RDMA function
    fn char_devices(&self, pci_address: &str) -> Vec<String>;
}

/// Per-class character device lookups, in the order they are reported
const CHAR_DEVICE_CLASSES: [(&str, &str); 4] = [
    ("infiniband_cm", "ucm"),
    ("infiniband_mad", "issm"),
    ("infiniband_mad", "umad"),
    ("infiniband_verbs", "uverbs"),
];

/// Resolver backed by the kernel's InfiniBand sysfs classes
#[derive(Debug, Clone, Default)]
pub struct SysfsRdmaResolver {
    paths: HostPaths,
}

impl SysfsRdmaResolver {
    /// Create a resolver reading from `paths`
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// RDMA device names (e.g. `mlx5_0`) registered under a PCI function
    pub fn rdma_devices_for_pci(&self, pci_address: &str) -> Vec<String> {
        let dir = self.paths.pci_devices.join(pci_address).join("infiniband");
        list_dir(&dir).unwrap_or_default()
    }

    /// Character devices belonging to one RDMA device
    pub fn char_devices_for_rdma_device(&self, rdma_device: &str) -> Vec<String> {
        let mut devices = Vec::new();

        for (class, entry_prefix) in CHAR_DEVICE_CLASSES {
            let class_dir = self.paths.sys_class.join(class);
            devices.extend(self.matching_class_entries(&class_dir, entry_prefix, rdma_device));
        }

        let rdma_cm = self.paths.dev_infiniband.join("rdma_cm");
        if rdma_cm.exists() {
            devices.push(rdma_cm.to_string_lossy().into_owned());
        }

        devices
    }

    fn matching_class_entries(
        &self,
        class_dir: &Path,
        entry_prefix: &str,
        rdma_device: &str,
    ) -> Vec<String> {
        let Ok(entries) = list_dir(class_dir) else {
            return Vec::new();
        };

        entries
            .into_iter()
            .filter(|entry| entry.starts_with(entry_prefix))
            .filter(|entry| {
                read_trimmed(&class_dir.join(entry).join("ibdev"))
                    .map(|ibdev| ibdev == rdma_device)
                    .unwrap_or(false)
            })
            .map(|entry| self.paths.dev_infiniband.join(entry).to_string_lossy().into_owned())
            .collect()
    }
}

impl RdmaResolver for SysfsRdmaResolver {
    fn char_devices(&self, pci_address: &str) -> Vec<String> {
        let mut devices = Vec::new();
        for rdma_device in self.rdma_devices_for_pci(pci_address) {
            let found = self.char_devices_for_rdma_device(&rdma_device);
            debug!("{pci_address}: {rdma_device} -> {found:?}");
            devices.extend(found);
        }
        devices
    }
}
