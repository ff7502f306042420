//! Live link attribute queries

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sysfs::read_trimmed;
use super::HostPaths;
use crate::error::{RdmaCdiError, Result};

/// RFC 2863 operational state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    /// Up and able to pass traffic
    Up,
    /// Down
    Down,
    /// Driver does not report a state
    Unknown,
    /// Waiting for an external event
    Dormant,
    /// A lower layer is down
    LowerLayerDown,
    /// Hardware missing
    NotPresent,
    /// In test mode
    Testing,
}

impl FromStr for OperState {
    type Err = RdmaCdiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(OperState::Up),
            "down" => Ok(OperState::Down),
            "unknown" => Ok(OperState::Unknown),
            "dormant" => Ok(OperState::Dormant),
            "lowerlayerdown" => Ok(OperState::LowerLayerDown),
            "notpresent" => Ok(OperState::NotPresent),
            "testing" => Ok(OperState::Testing),
            other => Err(RdmaCdiError::Validation(format!(
                "unrecognised operstate {other:?}"
            ))),
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperState::Up => "up",
            OperState::Down => "down",
            OperState::Unknown => "unknown",
            OperState::Dormant => "dormant",
            OperState::LowerLayerDown => "lowerlayerdown",
            OperState::NotPresent => "notpresent",
            OperState::Testing => "testing",
        };
        f.write_str(name)
    }
}

/// Attributes of one network link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttrs {
    /// Operational state
    pub oper_state: OperState,
    /// Encapsulation type (e.g. `ether`, `infiniband`)
    pub encap_type: String,
    /// MTU in bytes
    pub mtu: u32,
}

/// Looks up live link attributes by interface name
#[cfg_attr(test, mockall::automock)]
pub trait LinkQuery {
    /// Attributes of `if_name`, or an error if the link cannot be queried
    fn link_by_name(&self, if_name: &str) -> Result<LinkAttrs>;
}

/// Encapsulation name for an ARPHRD_* link type number
pub fn encap_type_name(arphrd: u32) -> &'static str {
    match arphrd {
        1 => "ether",
        32 => "infiniband",
        772 => "loopback",
        776 => "sit",
        778 => "ipgre",
        65534 => "none",
        _ => "unknown",
    }
}

/// Link query reading `operstate`, `mtu` and `type` from the net class tree
#[derive(Debug, Clone, Default)]
pub struct SysfsLinkQuery {
    paths: HostPaths,
}

impl SysfsLinkQuery {
    /// Create a link query reading from `paths`
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }
}

impl LinkQuery for SysfsLinkQuery {
    fn link_by_name(&self, if_name: &str) -> Result<LinkAttrs> {
        let dir = self.paths.net_devices.join(if_name);
        if !dir.exists() {
            return Err(RdmaCdiError::NotFound(format!("link {if_name:?} not found")));
        }

        let oper_state = read_trimmed(&dir.join("operstate"))?.parse()?;
        let mtu = read_trimmed(&dir.join("mtu"))?.parse::<u32>().map_err(|e| {
            RdmaCdiError::Validation(format!("invalid mtu for link {if_name:?}: {e}"))
        })?;
        // type is informational only, a bad value should not hide the state
        let encap_type = read_trimmed(&dir.join("type"))
            .ok()
            .and_then(|raw| raw.parse::<u32>().ok())
            .map(encap_type_name)
            .unwrap_or("unknown")
            .to_string();

        Ok(LinkAttrs {
            oper_state,
            encap_type,
            mtu,
        })
    }
}
