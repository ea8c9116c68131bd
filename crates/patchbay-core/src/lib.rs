//! Patchbay Core - topology model and migration plan generation
//!
//! This crate provides the foundational types for the patchbay system:
//! - Layout wire-format decoding, device-type normalization, and validation
//! - Topology model: nodes made of one CPU and its attached devices
//! - Task and Plan types for hardware lifecycle operations
//! - The update-plan generator: destruct/construct task sets, dependency
//!   resolution, and redundancy elimination

pub mod device;
pub mod layout;
pub mod plan;
pub mod task;
pub mod topology;

pub use device::DeviceId;
pub use layout::{BoundDevices, DeviceEntry, Layout, LayoutError, NodeEntry};
pub use plan::Plan;
pub use task::{OpIdSequence, Operation, Task, TaskId, TaskRecord};
pub use topology::{Node, Topology, TopologyError};
