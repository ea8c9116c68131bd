//! Topology model: nodes decoded from a validated layout

use thiserror::Error;

use crate::device::DeviceId;
use crate::layout::{BoundDevices, Layout, NodeEntry};

#[derive(Error, Debug)]
pub enum TopologyError {
    /// A node violates the input contract in a way the schema layer did
    /// not catch: no cpu entry, or no cpu device id left.
    #[error("Malformed topology: {0}")]
    Malformed(String),
}

/// A CPU plus its attached devices in one topology snapshot.
///
/// Bound (non-removable) devices are filtered out at construction and are
/// never targeted by connect/disconnect tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    cpu: DeviceId,
    other_devices: Vec<DeviceId>,
}

impl Node {
    /// Build a node from a layout entry, dropping every device id listed
    /// as bound to this node's CPU.
    pub fn from_entry(
        entry: &NodeEntry,
        bound_devices: &BoundDevices,
    ) -> Result<Self, TopologyError> {
        let cpu_entry = entry
            .device
            .get("cpu")
            .ok_or_else(|| TopologyError::Malformed("node has no cpu entry".into()))?;
        // The bound-devices lookup key is the node's CPU id as declared,
        // before any filtering.
        let cpu_id = cpu_entry
            .device_ids
            .first()
            .ok_or_else(|| TopologyError::Malformed("node has no cpu device id".into()))?;

        let bound = bound_devices.get(cpu_id);
        let is_bound = |device_type: &str, id: &DeviceId| {
            bound
                .and_then(|types| types.get(device_type))
                .is_some_and(|ids| ids.contains(id))
        };

        // The cpu list is filtered like every other type; a layout that
        // binds a CPU id under its own entry leaves the node without one.
        let cpu = cpu_entry
            .device_ids
            .iter()
            .find(|id| !is_bound("cpu", id))
            .cloned()
            .ok_or_else(|| TopologyError::Malformed("node has no cpu device id".into()))?;

        let mut other_devices = Vec::new();
        for (device_type, devices) in &entry.device {
            if device_type == "cpu" {
                continue;
            }
            for id in &devices.device_ids {
                if !is_bound(device_type, id) {
                    other_devices.push(id.clone());
                }
            }
        }

        Ok(Self { cpu, other_devices })
    }

    /// The node's anchor CPU id.
    pub fn cpu(&self) -> &DeviceId {
        &self.cpu
    }

    /// Non-CPU device ids, in device-type order then per-type id order.
    pub fn other_devices(&self) -> &[DeviceId] {
        &self.other_devices
    }
}

/// An ordered collection of nodes; one node per CPU
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub nodes: Vec<Node>,
}

impl Topology {
    /// Decode a normalized layout, applying the bound-devices map
    /// (sourced from the desired layout) to every node.
    pub fn from_layout(
        layout: &Layout,
        bound_devices: &BoundDevices,
    ) -> Result<Self, TopologyError> {
        let nodes = layout
            .nodes
            .iter()
            .map(|entry| Node::from_entry(entry, bound_devices))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nodes })
    }
}
