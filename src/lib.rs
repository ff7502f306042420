//! # rdma-cdi - RDMA device discovery and CDI spec generation
//!
//! Finds the RDMA character devices behind a PCI function or network
//! interface on Linux, writes Container Device Interface (CDI) specs that
//! expose them to containers, and diagnoses the host RDMA setup.
//!
//! ## Features
//!
//! - **Discovery** from sysfs by PCI address, interface name, or host wide
//! - **CDI specs** in JSON or YAML, written atomically
//! - **Safe cleanup** that only touches files this tool generated
//! - **Doctor** checks for char devices, kernel modules, link state and
//!   RDMA netns mode
//! - **Parallel scanning** of the PCI bus (feature `parallel`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use rdma_cdi::{cdi, discovery};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dev = discovery::discover_device_by_ifname("ib0")?;
//!     let path = cdi::create_cdi_spec("rdma", "ib0", &[dev], "/etc/cdi", "yaml")?;
//!     println!("wrote {}", path.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cdi;
pub mod device;
pub mod discovery;
pub mod doctor;
pub mod error;
pub mod utils;

pub use cdi::{cleanup_specs, create_cdi_spec, Spec, SpecFormat};
pub use device::{DeviceNode, RdmaDevice};
pub use discovery::{
    discover_device, discover_device_by_ifname, DeviceDiscoverer, HostPaths, SysfsDiscoverer,
};
pub use doctor::{merge_reports, CheckResult, Doctor, Report, Severity};
pub use error::{RdmaCdiError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
///
/// # Example
///
/// ```
/// println!("Using rdma-cdi v{}", rdma_cdi::version());
/// ```
pub fn version() -> &'static str {
    VERSION
}


/// Prelude module for convenient imports
///
/// # Example
///
/// ```no_run
/// use rdma_cdi::prelude::*;
///
/// let devices = SysfsDiscoverer::new().discover_all()?;
/// # Ok::<(), RdmaCdiError>(())
/// ```
pub mod prelude {
    pub use crate::cdi::{cleanup_specs, create_cdi_spec, generate_per_device, SpecFormat};
    pub use crate::device::RdmaDevice;
    pub use crate::discovery::{DeviceDiscoverer, HostPaths, SysfsDiscoverer};
    pub use crate::doctor::{Doctor, Report, Severity};
    pub use crate::error::{RdmaCdiError, Result};
    pub use crate::version;
}
