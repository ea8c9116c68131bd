//! Lifecycle tasks and their serialized form

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// One atomic hardware lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Shutdown,
    Boot,
    Connect,
    Disconnect,
}

impl Operation {
    /// Power operations target a CPU and carry no separate device id.
    pub fn is_power(self) -> bool {
        matches!(self, Operation::Shutdown | Operation::Boot)
    }
}

/// Identifier of a task, unique within one plan-generation session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-scoped source of task ids, starting at 1.
///
/// Each plan-building session owns its own sequence, so concurrent
/// invocations cannot collide on operation ids.
#[derive(Debug, Default)]
pub struct OpIdSequence(u64);

impl OpIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> TaskId {
        self.0 += 1;
        TaskId(self.0)
    }
}

/// A single task in a migration plan.
///
/// Dependencies are stored as task ids into the owning plan; equality and
/// ordering follow the id, which doubles as creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub operation: Operation,
    pub cpu_id: DeviceId,
    pub device_id: Option<DeviceId>,
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Create a task with the next id from the session sequence. The
    /// dependency list is taken by value; the task owns it outright.
    pub fn new(
        seq: &mut OpIdSequence,
        operation: Operation,
        cpu_id: DeviceId,
        device_id: Option<DeviceId>,
        dependencies: Vec<TaskId>,
    ) -> Self {
        Self {
            id: seq.next_id(),
            operation,
            cpu_id,
            device_id,
            dependencies,
        }
    }

    /// Serializable form of this task.
    ///
    /// Power operations report their CPU under `targetDeviceID` (a quirk
    /// of the wire format); connect/disconnect report `targetCPUID`, plus
    /// `targetDeviceID` when a non-empty device id is present.
    pub fn to_record(&self) -> TaskRecord {
        let (target_cpu_id, target_device_id) = if self.operation.is_power() {
            (None, Some(self.cpu_id.clone()))
        } else {
            (
                Some(self.cpu_id.clone()),
                self.device_id.clone().filter(|id| !id.is_empty()),
            )
        };
        TaskRecord {
            operation_id: self.id,
            operation: self.operation,
            dependencies: self.dependencies.clone(),
            target_cpu_id,
            target_device_id,
        }
    }
}

/// Wire form of a task, one element of the plan's output array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "operationID")]
    pub operation_id: TaskId,
    pub operation: Operation,
    pub dependencies: Vec<TaskId>,
    #[serde(
        rename = "targetCPUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_cpu_id: Option<DeviceId>,
    #[serde(
        rename = "targetDeviceID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_device_id: Option<DeviceId>,
}
