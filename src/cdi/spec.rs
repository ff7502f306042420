//! CDI document types and serialization

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceNode, RdmaDevice};
use crate::error::{RdmaCdiError, Result};

/// CDI specification version written into every document
pub const CDI_VERSION: &str = "0.8.0";

/// A CDI specification document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    /// CDI version
    pub cdi_version: String,
    /// Fully qualified kind, `vendor/class`
    pub kind: String,
    /// Devices made available by this spec
    pub devices: Vec<Device>,
}

/// A named CDI device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Device name, the PCI address
    pub name: String,
    /// Edits applied to a container requesting this device
    pub container_edits: ContainerEdits,
}

/// Container edits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEdits {
    /// Device nodes to create inside the container
    #[serde(default)]
    pub device_nodes: Vec<SpecDeviceNode>,
}

/// A device node entry of a CDI spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDeviceNode {
    /// Path inside the container
    pub path: String,
    /// Path on the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    /// Cgroup permissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl From<&DeviceNode> for SpecDeviceNode {
    fn from(node: &DeviceNode) -> Self {
        Self {
            path: node.container_path.clone(),
            host_path: Some(node.host_path.clone()),
            permissions: Some(node.permissions.clone()),
        }
    }
}

impl From<&RdmaDevice> for Device {
    fn from(dev: &RdmaDevice) -> Self {
        Self {
            name: dev.pci_address.clone(),
            container_edits: ContainerEdits {
                device_nodes: dev.device_nodes.iter().map(SpecDeviceNode::from).collect(),
            },
        }
    }
}

impl Spec {
    /// Build a spec of kind `prefix/name` with one entry per device
    pub fn build(resource_prefix: &str, resource_name: &str, devices: &[RdmaDevice]) -> Self {
        Self {
            cdi_version: CDI_VERSION.to_string(),
            kind: format!("{resource_prefix}/{resource_name}"),
            devices: devices.iter().map(Device::from).collect(),
        }
    }

    /// Basic structural checks before writing
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_empty() {
            return Err(RdmaCdiError::Validation(
                "spec kind must not be empty".to_string(),
            ));
        }
        if self.devices.is_empty() {
            return Err(RdmaCdiError::Validation(
                "spec must contain at least one device".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to `format`.
    ///
    /// YAML is produced from the JSON value so both formats carry the same
    /// fields in the same order.
    pub fn marshal(&self, format: SpecFormat) -> Result<Vec<u8>> {
        match format {
            SpecFormat::Json => Ok(serde_json::to_vec_pretty(self)?),
            SpecFormat::Yaml => {
                let value = serde_json::to_value(self)?;
                Ok(serde_yaml::to_string(&value)?.into_bytes())
            }
        }
    }
}

/// Output formats for spec files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    /// Indented JSON
    Json,
    /// YAML
    Yaml,
}

impl SpecFormat {
    /// Every supported format; cleanup only touches these extensions
    pub const ALL: [SpecFormat; 2] = [SpecFormat::Json, SpecFormat::Yaml];

    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            SpecFormat::Json => "json",
            SpecFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for SpecFormat {
    type Err = RdmaCdiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SpecFormat::Json),
            "yaml" => Ok(SpecFormat::Yaml),
            _ => Err(RdmaCdiError::Format(s.to_string())),
        }
    }
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Spec {
        let dev = RdmaDevice::new(
            "0000:17:00.0",
            vec![
                "/dev/infiniband/umad0".to_string(),
                "/dev/infiniband/uverbs0".to_string(),
                "/dev/infiniband/rdma_cm".to_string(),
            ],
        );
        Spec::build("rdma", "test-dev", &[dev])
    }

    #[test]
    fn test_build_kind_and_devices() {
        let spec = sample();
        assert_eq!(spec.kind, "rdma/test-dev");
        assert_eq!(spec.cdi_version, CDI_VERSION);
        assert_eq!(spec.devices.len(), 1);
        assert_eq!(spec.devices[0].name, "0000:17:00.0");
        let nodes = &spec.devices[0].container_edits.device_nodes;
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].path, "/dev/infiniband/uverbs0");
        assert_eq!(nodes[1].host_path.as_deref(), Some("/dev/infiniband/uverbs0"));
        assert_eq!(nodes[1].permissions.as_deref(), Some("rw"));
    }

    #[test]
    fn test_validate_rejects_empty() {
        let mut spec = sample();
        spec.devices.clear();
        assert!(matches!(spec.validate(), Err(RdmaCdiError::Validation(_))));

        let mut spec = sample();
        spec.kind.clear();
        assert!(matches!(spec.validate(), Err(RdmaCdiError::Validation(_))));
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value =
            serde_json::from_slice(&sample().marshal(SpecFormat::Json).unwrap()).unwrap();
        assert_eq!(json["cdiVersion"], CDI_VERSION);
        assert_eq!(json["kind"], "rdma/test-dev");
        let node = &json["devices"][0]["containerEdits"]["deviceNodes"][2];
        assert_eq!(node["path"], "/dev/infiniband/rdma_cm");
        assert_eq!(node["hostPath"], "/dev/infiniband/rdma_cm");
        assert_eq!(node["permissions"], "rw");
    }

    #[test]
    fn test_yaml_matches_json_content_and_order() {
        let spec = sample();
        let yaml = String::from_utf8(spec.marshal(SpecFormat::Yaml).unwrap()).unwrap();
        let from_yaml: Spec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(from_yaml, spec);

        let cdi = yaml.find("cdiVersion").unwrap();
        let kind = yaml.find("kind").unwrap();
        let devices = yaml.find("devices").unwrap();
        assert!(cdi < kind && kind < devices, "{yaml}");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse::<SpecFormat>().unwrap(), SpecFormat::Json);
        assert_eq!("YAML".parse::<SpecFormat>().unwrap(), SpecFormat::Yaml);
        let err = "xml".parse::<SpecFormat>().unwrap_err();
        assert!(matches!(err, RdmaCdiError::Format(ref f) if f == "xml"));
    }
}
