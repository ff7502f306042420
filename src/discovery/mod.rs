//! RDMA device discovery
//!
//! Correlates the PCI device tree, network interfaces and RDMA character
//! devices into [`RdmaDevice`] records. Only the presence of the required
//! RDMA device types is a hard requirement; every other attribute is read
//! best-effort and left empty if the host does not expose it.

mod link;
mod resolver;
pub mod sysfs;

pub use link::{encap_type_name, LinkAttrs, LinkQuery, OperState, SysfsLinkQuery};
pub use resolver::{RdmaResolver, SysfsRdmaResolver};

#[cfg(test)]
pub use link::MockLinkQuery;
#[cfg(test)]
pub use resolver::MockRdmaResolver;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::device::{verify_rdma_devices, RdmaDevice};
use crate::error::{RdmaCdiError, Result};

/// Host filesystem locations read during discovery and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// PCI device tree (`/sys/bus/pci/devices`)
    pub pci_devices: PathBuf,
    /// Network device tree (`/sys/class/net`)
    pub net_devices: PathBuf,
    /// Loaded kernel modules (`/sys/module`)
    pub sys_module: PathBuf,
    /// Device classes (`/sys/class`)
    pub sys_class: PathBuf,
    /// RDMA character device directory (`/dev/infiniband`)
    pub dev_infiniband: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl HostPaths {
    /// Standard layout below `root`, used for fake trees in tests
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            pci_devices: root.join("sys/bus/pci/devices"),
            net_devices: root.join("sys/class/net"),
            sys_module: root.join("sys/module"),
            sys_class: root.join("sys/class"),
            dev_infiniband: root.join("dev/infiniband"),
        }
    }
}

/// The three ways of finding RDMA devices
pub trait DeviceDiscoverer {
    /// Discover the device at a PCI BDF address
    fn discover_by_pci(&self, pci_address: &str) -> Result<RdmaDevice>;

    /// Discover the device behind a network interface
    fn discover_by_ifname(&self, if_name: &str) -> Result<RdmaDevice>;

    /// Discover every RDMA device on the host
    fn discover_all(&self) -> Result<Vec<RdmaDevice>>;
}

/// Discoverer reading sysfs through pluggable resolver and link collaborators
#[derive(Debug, Clone)]
pub struct SysfsDiscoverer<R = SysfsRdmaResolver, L = SysfsLinkQuery> {
    paths: HostPaths,
    resolver: R,
    link: L,
}

impl SysfsDiscoverer {
    /// Discoverer for the real host
    pub fn new() -> Self {
        Self::with_paths(HostPaths::default())
    }

    /// Discoverer reading every collaborator from `paths`
    pub fn with_paths(paths: HostPaths) -> Self {
        Self {
            resolver: SysfsRdmaResolver::new(paths.clone()),
            link: SysfsLinkQuery::new(paths.clone()),
            paths,
        }
    }
}

impl Default for SysfsDiscoverer {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, L> SysfsDiscoverer<R, L>
where
    R: RdmaResolver,
    L: LinkQuery,
{
    /// Discoverer with explicit collaborators
    pub fn with_collaborators(paths: HostPaths, resolver: R, link: L) -> Self {
        Self {
            paths,
            resolver,
            link,
        }
    }

    /// Host paths this discoverer reads from
    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// PCI address behind a network interface, from its `device` symlink
    pub fn pci_address_for_ifname(&self, if_name: &str) -> Result<String> {
        let link = self.paths.net_devices.join(if_name).join("device");
        let meta = fs::symlink_metadata(&link).map_err(|e| {
            RdmaCdiError::NotFound(format!(
                "cannot stat device symlink for interface {if_name:?}: {e}"
            ))
        })?;
        if !meta.file_type().is_symlink() {
            return Err(RdmaCdiError::NotFound(format!(
                "no symbolic link for interface {if_name:?}"
            )));
        }
        sysfs::link_basename(&link)
    }

    /// Network interface names under a PCI function
    pub fn net_names(&self, pci_address: &str) -> Vec<String> {
        sysfs::list_dir(&self.paths.pci_devices.join(pci_address).join("net")).unwrap_or_default()
    }

    /// Kernel driver bound to a PCI function
    pub fn driver(&self, pci_address: &str) -> Option<String> {
        sysfs::link_basename(&self.paths.pci_devices.join(pci_address).join("driver")).ok()
    }

    /// PCI vendor ID
    pub fn vendor_id(&self, pci_address: &str) -> Option<String> {
        sysfs::read_attr(&self.paths.pci_devices.join(pci_address).join("vendor"))
    }

    /// PCI device ID
    pub fn device_id(&self, pci_address: &str) -> Option<String> {
        sysfs::read_attr(&self.paths.pci_devices.join(pci_address).join("device"))
    }

    /// Link encapsulation type of an interface
    pub fn link_type(&self, if_name: &str) -> Option<String> {
        self.link
            .link_by_name(if_name)
            .map(|attrs| attrs.encap_type)
            .ok()
    }

    /// Populate a device record; every lookup here may fail without consequence
    fn build_device(&self, pci_address: &str, char_devices: Vec<String>) -> RdmaDevice {
        let mut dev = RdmaDevice::new(pci_address, char_devices);
        dev.vendor_id = self.vendor_id(pci_address);
        dev.device_id = self.device_id(pci_address);
        dev.interface_name = self.net_names(pci_address).into_iter().next();
        dev.driver = self.driver(pci_address);
        dev.link_type = dev
            .interface_name
            .as_deref()
            .and_then(|name| self.link_type(name));
        dev
    }
}

impl<R, L> DeviceDiscoverer for SysfsDiscoverer<R, L>
where
    R: RdmaResolver + Sync,
    L: LinkQuery,
{
    fn discover_by_pci(&self, pci_address: &str) -> Result<RdmaDevice> {
        let char_devices = self.resolver.char_devices(pci_address);
        if char_devices.is_empty() {
            return Err(RdmaCdiError::NotFound(format!(
                "no RDMA character devices found for PCI address {pci_address}"
            )));
        }

        if let Err(RdmaCdiError::Validation(reason)) = verify_rdma_devices(&char_devices) {
            return Err(RdmaCdiError::Validation(format!(
                "RDMA device verification failed for {pci_address}: {reason}"
            )));
        }

        let dev = self.build_device(pci_address, char_devices);
        debug!("discovered {dev:?}");
        Ok(dev)
    }

    fn discover_by_ifname(&self, if_name: &str) -> Result<RdmaDevice> {
        let pci_address = self.pci_address_for_ifname(if_name).map_err(|e| match e {
            RdmaCdiError::NotFound(reason) => RdmaCdiError::NotFound(format!(
                "cannot resolve PCI address for interface {if_name:?}: {reason}"
            )),
            other => other,
        })?;

        let mut dev = self.discover_by_pci(&pci_address)?;
        dev.interface_name = Some(if_name.to_string());
        Ok(dev)
    }

    fn discover_all(&self) -> Result<Vec<RdmaDevice>> {
        let entries = sysfs::list_dir(&self.paths.pci_devices).map_err(|e| {
            RdmaCdiError::NotFound(format!(
                "cannot read PCI bus directory {}: {e}",
                self.paths.pci_devices.display()
            ))
        })?;

        let resolver = &self.resolver;
        #[cfg(feature = "parallel")]
        let resolved: Vec<(String, Vec<String>)> = entries
            .into_par_iter()
            .map(|pci| {
                let char_devices = resolver.char_devices(&pci);
                (pci, char_devices)
            })
            .collect();
        #[cfg(not(feature = "parallel"))]
        let resolved: Vec<(String, Vec<String>)> = entries
            .into_iter()
            .map(|pci| {
                let char_devices = resolver.char_devices(&pci);
                (pci, char_devices)
            })
            .collect();

        let devices: Vec<RdmaDevice> = resolved
            .into_iter()
            .filter(|(_, char_devices)| !char_devices.is_empty())
            .map(|(pci, char_devices)| self.build_device(&pci, char_devices))
            .collect();

        if devices.is_empty() {
            return Err(RdmaCdiError::NotFound(
                "no RDMA devices found on the host".to_string(),
            ));
        }
        info!("discovered {} RDMA device(s)", devices.len());
        Ok(devices)
    }
}

/// Discover the device at `pci_address` on the real host
pub fn discover_device(pci_address: &str) -> Result<RdmaDevice> {
    SysfsDiscoverer::new().discover_by_pci(pci_address)
}

/// Discover the device behind `if_name` on the real host
pub fn discover_device_by_ifname(if_name: &str) -> Result<RdmaDevice> {
    SysfsDiscoverer::new().discover_by_ifname(if_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Resolver answering from a fixed table
    #[derive(Default)]
    struct FakeResolver(HashMap<String, Vec<String>>);

    impl FakeResolver {
        fn with(mut self, pci: &str, devices: &[&str]) -> Self {
            self.0
                .insert(pci.to_string(), devices.iter().map(|d| d.to_string()).collect());
            self
        }
    }

    impl RdmaResolver for FakeResolver {
        fn char_devices(&self, pci_address: &str) -> Vec<String> {
            self.0.get(pci_address).cloned().unwrap_or_default()
        }
    }

    const FULL: [&str; 3] = [
        "/dev/infiniband/rdma_cm",
        "/dev/infiniband/umad0",
        "/dev/infiniband/uverbs0",
    ];

    fn pci_dir(paths: &HostPaths, pci: &str) -> PathBuf {
        let dir = paths.pci_devices.join(pci);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn down_link() -> MockLinkQuery {
        let mut link = MockLinkQuery::new();
        link.expect_link_by_name().returning(|_| {
            Ok(LinkAttrs {
                oper_state: OperState::Down,
                encap_type: "infiniband".to_string(),
                mtu: 2044,
            })
        });
        link
    }

    #[test]
    fn test_discover_by_pci_enriches_record() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        let dir = pci_dir(&paths, "0000:17:00.0");
        fs::write(dir.join("vendor"), "0x15b3\n").unwrap();
        fs::write(dir.join("device"), "0x101b\n").unwrap();
        fs::create_dir_all(dir.join("net/ib0")).unwrap();
        symlink("../../../bus/pci/drivers/mlx5_core", dir.join("driver")).unwrap();

        let resolver = FakeResolver::default().with("0000:17:00.0", &FULL);
        let discoverer = SysfsDiscoverer::with_collaborators(paths, resolver, down_link());

        let dev = discoverer.discover_by_pci("0000:17:00.0").unwrap();
        assert_eq!(dev.pci_address, "0000:17:00.0");
        assert_eq!(dev.vendor_id.as_deref(), Some("15b3"));
        assert_eq!(dev.device_id.as_deref(), Some("101b"));
        assert_eq!(dev.interface_name.as_deref(), Some("ib0"));
        assert_eq!(dev.driver.as_deref(), Some("mlx5_core"));
        assert_eq!(dev.link_type.as_deref(), Some("infiniband"));
        assert_eq!(dev.char_device_paths, FULL.to_vec());
        assert_eq!(dev.device_nodes.len(), 3);
    }

    #[test]
    fn test_discover_by_pci_tolerates_missing_attributes() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        let resolver = FakeResolver::default().with("0000:17:00.0", &FULL);
        let mut link = MockLinkQuery::new();
        link.expect_link_by_name().never();
        let discoverer = SysfsDiscoverer::with_collaborators(paths, resolver, link);

        let dev = discoverer.discover_by_pci("0000:17:00.0").unwrap();
        assert_eq!(dev.vendor_id, None);
        assert_eq!(dev.device_id, None);
        assert_eq!(dev.interface_name, None);
        assert_eq!(dev.driver, None);
        assert_eq!(dev.link_type, None);
    }

    #[test]
    fn test_discover_by_pci_failed_link_query_leaves_type_empty() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        fs::create_dir_all(pci_dir(&paths, "0000:17:00.0").join("net/eth2")).unwrap();
        let resolver = FakeResolver::default().with("0000:17:00.0", &FULL);
        let mut link = MockLinkQuery::new();
        link.expect_link_by_name()
            .returning(|name| Err(RdmaCdiError::NotFound(format!("link {name} not found"))));
        let discoverer = SysfsDiscoverer::with_collaborators(paths, resolver, link);

        let dev = discoverer.discover_by_pci("0000:17:00.0").unwrap();
        assert_eq!(dev.interface_name.as_deref(), Some("eth2"));
        assert_eq!(dev.link_type, None);
    }

    #[test]
    fn test_discover_by_pci_no_char_devices() {
        let tmp = TempDir::new().unwrap();
        let mut resolver = MockRdmaResolver::new();
        resolver.expect_char_devices().returning(|_| Vec::new());
        let discoverer = SysfsDiscoverer::with_collaborators(
            HostPaths::with_root(tmp.path()),
            resolver,
            MockLinkQuery::new(),
        );

        let err = discoverer.discover_by_pci("0000:99:00.0").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("0000:99:00.0"));
    }

    #[test]
    fn test_discover_by_pci_missing_required_type() {
        let tmp = TempDir::new().unwrap();
        let resolver = FakeResolver::default().with("0000:17:00.0", &["/dev/infiniband/uverbs0"]);
        let discoverer = SysfsDiscoverer::with_collaborators(
            HostPaths::with_root(tmp.path()),
            resolver,
            MockLinkQuery::new(),
        );

        let err = discoverer.discover_by_pci("0000:17:00.0").unwrap_err();
        assert!(matches!(err, RdmaCdiError::Validation(_)));
        assert!(err.to_string().contains("0000:17:00.0"));
    }

    #[test]
    fn test_discover_by_ifname_prefers_caller_name() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        fs::create_dir_all(pci_dir(&paths, "0000:17:00.0").join("net/ib0")).unwrap();
        let if_dir = paths.net_devices.join("ib-alias");
        fs::create_dir_all(&if_dir).unwrap();
        symlink("../../../devices/pci0000:00/0000:17:00.0", if_dir.join("device")).unwrap();

        let resolver = FakeResolver::default().with("0000:17:00.0", &FULL);
        let discoverer = SysfsDiscoverer::with_collaborators(paths, resolver, down_link());

        let dev = discoverer.discover_by_ifname("ib-alias").unwrap();
        assert_eq!(dev.pci_address, "0000:17:00.0");
        assert_eq!(dev.interface_name.as_deref(), Some("ib-alias"));
    }

    #[test]
    fn test_discover_by_ifname_requires_symlink() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        let if_dir = paths.net_devices.join("lo");
        fs::create_dir_all(if_dir.join("device")).unwrap();
        let discoverer = SysfsDiscoverer::with_collaborators(
            paths,
            FakeResolver::default(),
            MockLinkQuery::new(),
        );

        let err = discoverer.discover_by_ifname("lo").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no symbolic link"));
    }

    #[test]
    fn test_discover_by_ifname_unknown_interface() {
        let tmp = TempDir::new().unwrap();
        let discoverer = SysfsDiscoverer::with_collaborators(
            HostPaths::with_root(tmp.path()),
            FakeResolver::default(),
            MockLinkQuery::new(),
        );
        assert!(discoverer.discover_by_ifname("nope0").unwrap_err().is_not_found());
    }

    #[test]
    fn test_discover_all_skips_non_rdma_functions() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        for pci in ["0000:00:1f.0", "0000:17:00.0", "0000:17:00.1", "0000:3b:00.0"] {
            pci_dir(&paths, pci);
        }
        let resolver = FakeResolver::default()
            .with("0000:17:00.0", &FULL)
            .with("0000:3b:00.0", &["/dev/infiniband/uverbs4"]);
        let discoverer = SysfsDiscoverer::with_collaborators(paths, resolver, down_link());

        let devices = discoverer.discover_all().unwrap();
        let addresses: Vec<&str> = devices.iter().map(|d| d.pci_address.as_str()).collect();
        assert_eq!(addresses, vec!["0000:17:00.0", "0000:3b:00.0"]);
    }

    #[test]
    fn test_discover_all_empty_host() {
        let tmp = TempDir::new().unwrap();
        let paths = HostPaths::with_root(tmp.path());
        pci_dir(&paths, "0000:00:00.0");
        let discoverer = SysfsDiscoverer::with_collaborators(
            paths,
            FakeResolver::default(),
            MockLinkQuery::new(),
        );
        assert!(discoverer.discover_all().unwrap_err().is_not_found());
    }

    #[test]
    fn test_discover_all_missing_pci_tree() {
        let tmp = TempDir::new().unwrap();
        let discoverer = SysfsDiscoverer::with_collaborators(
            HostPaths::with_root(tmp.path()),
            FakeResolver::default(),
            MockLinkQuery::new(),
        );
        let err = discoverer.discover_all().unwrap_err();
        assert!(err.to_string().contains("cannot read PCI bus directory"));
    }

    #[test]
    fn test_host_paths_default_layout() {
        let paths = HostPaths::default();
        assert_eq!(paths.pci_devices, PathBuf::from("/sys/bus/pci/devices"));
        assert_eq!(paths.net_devices, PathBuf::from("/sys/class/net"));
        assert_eq!(paths.dev_infiniband, PathBuf::from("/dev/infiniband"));
    }
}
