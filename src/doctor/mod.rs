//! RDMA environment diagnostics
//!
//! Checks character device presence, kernel modules, link attributes and the
//! RDMA network namespace mode. Nothing here returns an error: a probe that
//! cannot run shows up as a `Warn` or `Fail` result in the [`Report`].

mod report;

pub use report::{merge_reports, CheckResult, Report, Severity};

use std::fs;

use log::debug;

use crate::device::{verify_rdma_devices, RdmaDevice};
use crate::discovery::{HostPaths, LinkQuery, OperState, SysfsLinkQuery};
use crate::error::RdmaCdiError;

/// Kernel modules that must be loaded for RDMA device passthrough
pub const REQUIRED_KERNEL_MODULES: [&str; 5] =
    ["ib_core", "ib_uverbs", "ib_umad", "rdma_cm", "rdma_ucm"];

/// Netns mode parameter, relative to the module tree
const NETNS_MODE_PARAM: &str = "rdma_cm/parameters/net_ns_mode";
/// Older location of the same parameter
const NETNS_MODE_PARAM_LEGACY: &str = "ib_core/parameters/netns_mode";

/// Check identifiers
pub mod checks {
    /// Character device presence and required types
    pub const RDMA_DEVICES: &str = "rdma_devices";
    /// Required kernel modules
    pub const KERNEL_MODULES: &str = "kernel_modules";
    /// Associated network interface
    pub const NET_INTERFACE: &str = "net_interface";
    /// Link query failure
    pub const LINK_ATTRS: &str = "link_attrs";
    /// Link operational state
    pub const LINK_STATE: &str = "link_state";
    /// RDMA network namespace mode
    pub const RDMA_NETNS_MODE: &str = "rdma_netns_mode";
}

/// Runs the diagnostic checks against host state
#[derive(Debug, Clone)]
pub struct Doctor<L = SysfsLinkQuery> {
    paths: HostPaths,
    link: L,
}

impl Doctor {
    /// Doctor for the real host
    pub fn new() -> Self {
        Self::with_paths(HostPaths::default())
    }

    /// Doctor reading sysfs below `paths`
    pub fn with_paths(paths: HostPaths) -> Self {
        Self {
            link: SysfsLinkQuery::new(paths.clone()),
            paths,
        }
    }
}

impl Default for Doctor {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: LinkQuery> Doctor<L> {
    /// Doctor with an explicit link query
    pub fn with_link_query(paths: HostPaths, link: L) -> Self {
        Self { paths, link }
    }

    /// Run every check on one device.
    ///
    /// The link check refreshes `dev.link_type` when the link can be queried.
    pub fn diagnose_device(&self, dev: &mut RdmaDevice) -> Report {
        let mut report = Report::new();

        self.check_char_devices(&mut report, dev);
        self.check_kernel_modules(&mut report);

        match dev.interface_name.clone() {
            Some(if_name) => {
                report.add(CheckResult::device(
                    checks::NET_INTERFACE,
                    Severity::Pass,
                    format!("Interface: {if_name}"),
                    &dev.pci_address,
                ));
                self.check_link_attrs(&mut report, dev, &if_name);
            }
            None => report.add(CheckResult::device(
                checks::NET_INTERFACE,
                Severity::Warn,
                "No network interface associated",
                &dev.pci_address,
            )),
        }

        self.check_rdma_netns_mode(&mut report);

        debug!(
            "diagnosed {}: {} result(s), warn={}, fail={}",
            dev.pci_address,
            report.results().len(),
            report.has_warn(),
            report.has_fail()
        );
        report
    }

    /// Diagnose every device and merge the reports
    pub fn diagnose_all(&self, devices: &mut [RdmaDevice]) -> Report {
        let reports: Vec<Report> = devices
            .iter_mut()
            .map(|dev| self.diagnose_device(dev))
            .collect();
        merge_reports(&reports)
    }

    fn check_char_devices(&self, report: &mut Report, dev: &RdmaDevice) {
        let paths = &dev.char_device_paths;
        let result = if paths.is_empty() {
            CheckResult::device(
                checks::RDMA_DEVICES,
                Severity::Fail,
                "No RDMA character devices found",
                &dev.pci_address,
            )
        } else if let Err(e) = verify_rdma_devices(paths) {
            let reason = match e {
                RdmaCdiError::Validation(reason) => reason,
                other => other.to_string(),
            };
            CheckResult::device(
                checks::RDMA_DEVICES,
                Severity::Fail,
                format!(
                    "Found {} device(s) but missing required types: {reason}",
                    paths.len()
                ),
                &dev.pci_address,
            )
        } else {
            CheckResult::device(
                checks::RDMA_DEVICES,
                Severity::Pass,
                format!(
                    "All required RDMA devices present ({}): {}",
                    paths.len(),
                    paths.join(", ")
                ),
                &dev.pci_address,
            )
        };
        report.add(result);
    }

    fn check_kernel_modules(&self, report: &mut Report) {
        let missing: Vec<&str> = REQUIRED_KERNEL_MODULES
            .iter()
            .copied()
            .filter(|module| !self.paths.sys_module.join(module).exists())
            .collect();

        if missing.is_empty() {
            report.add(CheckResult::host(
                checks::KERNEL_MODULES,
                Severity::Pass,
                format!(
                    "All required kernel modules loaded: {}",
                    REQUIRED_KERNEL_MODULES.join(", ")
                ),
            ));
        } else {
            report.add(CheckResult::host(
                checks::KERNEL_MODULES,
                Severity::Fail,
                format!("Missing kernel modules: {}", missing.join(", ")),
            ));
        }
    }

    fn check_link_attrs(&self, report: &mut Report, dev: &mut RdmaDevice, if_name: &str) {
        let attrs = match self.link.link_by_name(if_name) {
            Ok(attrs) => attrs,
            Err(e) => {
                report.add(CheckResult::device(
                    checks::LINK_ATTRS,
                    Severity::Warn,
                    format!("Cannot query link {if_name}: {e}"),
                    &dev.pci_address,
                ));
                return;
            }
        };

        dev.link_type = Some(attrs.encap_type.clone());

        let severity = if attrs.oper_state == OperState::Up {
            Severity::Pass
        } else {
            Severity::Warn
        };
        report.add(CheckResult::device(
            checks::LINK_STATE,
            severity,
            format!(
                "Link {if_name} is {} (encap: {}, MTU: {})",
                attrs.oper_state, attrs.encap_type, attrs.mtu
            ),
            &dev.pci_address,
        ));
    }

    fn read_netns_mode(&self) -> Option<String> {
        [NETNS_MODE_PARAM, NETNS_MODE_PARAM_LEGACY]
            .iter()
            .find_map(|param| fs::read_to_string(self.paths.sys_module.join(param)).ok())
            .map(|raw| raw.trim().to_string())
    }

    fn check_rdma_netns_mode(&self, report: &mut Report) {
        let Some(mode) = self.read_netns_mode() else {
            report.add(CheckResult::host(
                checks::RDMA_NETNS_MODE,
                Severity::Warn,
                "Cannot read RDMA netns mode (sysfs path not available)",
            ));
            return;
        };

        let result = match mode.as_str() {
            "exclusive" | "1" | "Y" => CheckResult::host(
                checks::RDMA_NETNS_MODE,
                Severity::Pass,
                format!("RDMA netns mode: exclusive ({mode})"),
            ),
            "shared" | "0" | "N" => CheckResult::host(
                checks::RDMA_NETNS_MODE,
                Severity::Warn,
                format!(
                    "RDMA netns mode: shared ({mode}), containers may not isolate RDMA traffic"
                ),
            ),
            _ => CheckResult::host(
                checks::RDMA_NETNS_MODE,
                Severity::Warn,
                format!("Unknown RDMA netns mode: {mode:?}"),
            ),
        };
        report.add(result);
    }
}

/// Diagnose one device on the real host
pub fn diagnose_device(dev: &mut RdmaDevice) -> Report {
    Doctor::new().diagnose_device(dev)
}
