//! Layout wire format: decoding, device-type normalization, and validation
//!
//! A layout document describes one topology snapshot:
//!
//! ```json
//! {
//!   "nodes": [{"device": {"cpu": {"deviceIDs": ["cpu-01"]},
//!                         "memory": {"deviceIDs": ["mem-01"]}}}],
//!   "boundDevices": {"cpu-01": {"memory": ["mem-01"]}}
//! }
//! ```
//!
//! Device-type keys arrive in arbitrary case and are lower-cased here;
//! everything downstream matches them case-sensitively.

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::device::DeviceId;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Failed to parse layout: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid layout: {0}")]
    Validation(String),
}

/// Non-removable devices, keyed by CPU id and then by device type.
///
/// Sourced from the desired layout only and applied to both topologies.
pub type BoundDevices = IndexMap<DeviceId, IndexMap<String, Vec<DeviceId>>>;

/// One topology snapshot as received on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Layout {
    pub nodes: Vec<NodeEntry>,
    #[serde(default, rename = "boundDevices")]
    pub bound_devices: BoundDevices,
}

/// A node's raw device map: device type to device-id list
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    pub device: IndexMap<String, DeviceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "deviceIDs")]
    pub device_ids: Vec<DeviceId>,
}

impl Layout {
    /// Parse a layout document from JSON, normalize its device-type keys,
    /// and validate the node contract.
    pub fn parse(json: &str) -> Result<Self, LayoutError> {
        let layout: Layout = serde_json::from_str(json)?;
        layout.finish()
    }

    /// Like [`Layout::parse`], for a layout embedded in a larger JSON
    /// document that has already been decoded.
    pub fn from_value(value: serde_json::Value) -> Result<Self, LayoutError> {
        let layout: Layout = serde_json::from_value(value)?;
        layout.finish()
    }

    fn finish(mut self) -> Result<Self, LayoutError> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    /// Lower-case the device-type keys in `nodes` and `boundDevices`.
    pub fn normalize(&mut self) {
        for node in &mut self.nodes {
            node.device = lowercase_keys(std::mem::take(&mut node.device));
        }
        for types in self.bound_devices.values_mut() {
            *types = lowercase_keys(std::mem::take(types));
        }
    }

    /// Check the node contract: every node carries a `cpu` entry with
    /// exactly one device id. Runs after `normalize`.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let cpu = node.device.get("cpu").ok_or_else(|| {
                LayoutError::Validation(format!("node {index} has no cpu entry"))
            })?;
            if cpu.device_ids.len() != 1 {
                return Err(LayoutError::Validation(format!(
                    "node {index} must have exactly one cpu device id, found {}",
                    cpu.device_ids.len()
                )));
            }
        }
        Ok(())
    }
}

fn lowercase_keys<V>(map: IndexMap<String, V>) -> IndexMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases_device_types() {
        let layout = Layout::parse(
            r#"{
                "nodes": [{"device": {
                    "CPU": {"deviceIDs": ["cpu-01"]},
                    "Memory": {"deviceIDs": ["mem-01"]}
                }}],
                "boundDevices": {"cpu-01": {"Memory": ["mem-01"]}}
            }"#,
        )
        .unwrap();

        let node = &layout.nodes[0];
        assert!(node.device.contains_key("cpu"));
        assert!(node.device.contains_key("memory"));
        assert!(!node.device.contains_key("Memory"));

        let bound = &layout.bound_devices[&DeviceId::from("cpu-01")];
        assert_eq!(bound["memory"], vec![DeviceId::from("mem-01")]);
    }

    #[test]
    fn test_parse_preserves_device_type_order() {
        let layout = Layout::parse(
            r#"{"nodes": [{"device": {
                "cpu": {"deviceIDs": ["cpu-01"]},
                "storage": {"deviceIDs": ["ssd-01"]},
                "memory": {"deviceIDs": ["mem-01"]}
            }}]}"#,
        )
        .unwrap();

        let types: Vec<&str> = layout.nodes[0].device.keys().map(String::as_str).collect();
        assert_eq!(types, ["cpu", "storage", "memory"]);
    }

    #[test]
    fn test_validate_rejects_missing_cpu() {
        let err = Layout::parse(r#"{"nodes": [{"device": {"memory": {"deviceIDs": ["mem-01"]}}}]}"#)
            .unwrap_err();
        assert!(matches!(err, LayoutError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_empty_cpu_ids() {
        let err = Layout::parse(r#"{"nodes": [{"device": {"cpu": {"deviceIDs": []}}}]}"#)
            .unwrap_err();
        assert!(matches!(err, LayoutError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_multiple_cpu_ids() {
        let err = Layout::parse(
            r#"{"nodes": [{"device": {"cpu": {"deviceIDs": ["cpu-01", "cpu-02"]}}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::Validation(_)));
    }

    #[test]
    fn test_parse_rejects_node_without_device_key() {
        let err = Layout::parse(r#"{"nodes": [{"cpu": {"deviceIDs": ["cpu-01"]}}]}"#).unwrap_err();
        assert!(matches!(err, LayoutError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_missing_nodes_key() {
        let err = Layout::parse(r#"{"nods": []}"#).unwrap_err();
        assert!(matches!(err, LayoutError::Parse(_)));
    }

    #[test]
    fn test_from_value_normalizes_and_validates() {
        let layout = Layout::from_value(serde_json::json!({
            "nodes": [{"device": {"CPU": {"deviceIDs": ["cpu-01"]}}}]
        }))
        .unwrap();
        assert!(layout.nodes[0].device.contains_key("cpu"));

        let err = Layout::from_value(serde_json::json!({"nodes": [{"device": {}}]})).unwrap_err();
        assert!(matches!(err, LayoutError::Validation(_)));
    }

    #[test]
    fn test_bound_devices_default_empty() {
        let layout = Layout::parse(r#"{"nodes": []}"#).unwrap();
        assert!(layout.bound_devices.is_empty());
    }
}
