//! Plan generation: destruct/construct task sets, dependency resolution,
//! and redundancy elimination
//!
//! [`Plan::system_update_plan`] is the public entry point. It builds a
//! destruct plan from the previous topology and a construct plan from the
//! desired one, drops task pairs that cancel out, then resolves ordering
//! dependencies and prunes transitively implied edges. The result is a
//! static artifact for an external executor; nothing here runs hardware
//! operations.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::device::DeviceId;
use crate::task::{OpIdSequence, Operation, Task, TaskId, TaskRecord};
use crate::topology::{Node, Topology};

/// An ordered, dependency-annotated collection of tasks
#[derive(Debug, Default)]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Add a task to the plan.
    pub fn append(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Move every task of `other` into this plan.
    pub fn extend(&mut self, other: Plan) {
        self.tasks.extend(other.tasks);
    }

    /// Remove the task with the given id, if present.
    pub fn remove(&mut self, id: TaskId) {
        self.tasks.retain(|task| task.id != id);
    }

    /// Look up a task by id.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    fn sort_by_id(&mut self) {
        self.tasks.sort_by_key(|task| task.id);
    }

    /// Serializable form: one record per task, in plan order.
    pub fn encode(&self) -> Vec<TaskRecord> {
        self.tasks.iter().map(Task::to_record).collect()
    }

    /// Ids of tasks targeting the given device, in plan order.
    pub fn device_slice(&self, device_id: &DeviceId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|task| task.device_id.as_ref() == Some(device_id))
            .map(|task| task.id)
            .collect()
    }

    /// Ids of tasks scoped to the given CPU, in plan order.
    pub fn cpu_slice(&self, cpu_id: &DeviceId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|task| &task.cpu_id == cpu_id)
            .map(|task| task.id)
            .collect()
    }

    /// Distinct CPU ids, in first-appearance order.
    pub fn all_cpus(&self) -> Vec<DeviceId> {
        let mut seen = HashSet::new();
        self.tasks
            .iter()
            .filter(|task| seen.insert(task.cpu_id.clone()))
            .map(|task| task.cpu_id.clone())
            .collect()
    }

    /// Distinct device ids, in first-appearance order.
    pub fn all_devices(&self) -> Vec<DeviceId> {
        let mut seen = HashSet::new();
        self.tasks
            .iter()
            .filter_map(|task| task.device_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Map from CPU id to its pending shutdown task.
    fn shutdown_tasks(&self) -> HashMap<DeviceId, TaskId> {
        self.tasks
            .iter()
            .filter(|task| task.operation == Operation::Shutdown)
            .map(|task| (task.cpu_id.clone(), task.id))
            .collect()
    }

    /// Map from CPU id to its pending boot task.
    fn boot_tasks(&self) -> HashMap<DeviceId, TaskId> {
        self.tasks
            .iter()
            .filter(|task| task.operation == Operation::Boot)
            .map(|task| (task.cpu_id.clone(), task.id))
            .collect()
    }

    /// Compute the operation sequence transitioning `prev` into `new`.
    ///
    /// The id sequence is owned by this call; ids start at 1 and are never
    /// renumbered, so removed redundant tasks leave gaps in the output.
    pub fn system_update_plan(prev: &Topology, new: &Topology) -> Plan {
        let mut seq = OpIdSequence::new();
        let mut plan = Plan::system_destruct_plan(prev, &mut seq);
        plan.extend(Plan::system_construct_plan(new, &mut seq));
        plan.remove_redundant_tasks();
        plan.complete_device_dependencies();
        plan.remove_indirect_dependencies();
        debug!(tasks = plan.len(), "generated system update plan");
        plan
    }

    /// Shutdown and disconnect tasks for every node of a topology.
    pub fn system_destruct_plan(topology: &Topology, seq: &mut OpIdSequence) -> Plan {
        let mut plan = Plan::new();
        for node in &topology.nodes {
            plan.extend(Plan::node_destruct_plan(node, seq));
        }
        plan
    }

    /// One shutdown task, then a disconnect per attached device, each
    /// depending on the shutdown.
    pub fn node_destruct_plan(node: &Node, seq: &mut OpIdSequence) -> Plan {
        let mut plan = Plan::new();
        let shutdown = Task::new(seq, Operation::Shutdown, node.cpu().clone(), None, Vec::new());
        let shutdown_id = shutdown.id;
        plan.append(shutdown);
        for device_id in node.other_devices() {
            plan.append(Task::new(
                seq,
                Operation::Disconnect,
                node.cpu().clone(),
                Some(device_id.clone()),
                vec![shutdown_id],
            ));
        }
        plan
    }

    /// Connect and boot tasks for every node of a topology.
    pub fn system_construct_plan(topology: &Topology, seq: &mut OpIdSequence) -> Plan {
        let mut plan = Plan::new();
        for node in &topology.nodes {
            plan.extend(Plan::node_construct_plan(node, seq));
        }
        plan
    }

    /// A connect per attached device, then one boot task depending on all
    /// of them.
    pub fn node_construct_plan(node: &Node, seq: &mut OpIdSequence) -> Plan {
        let mut plan = Plan::new();
        let mut connect_ids = Vec::new();
        for device_id in node.other_devices() {
            let connect = Task::new(
                seq,
                Operation::Connect,
                node.cpu().clone(),
                Some(device_id.clone()),
                Vec::new(),
            );
            connect_ids.push(connect.id);
            plan.append(connect);
        }
        plan.append(Task::new(
            seq,
            Operation::Boot,
            node.cpu().clone(),
            None,
            connect_ids,
        ));
        plan
    }

    /// Drop task pairs that cancel out.
    ///
    /// A device with exactly two tasks on the same CPU was disconnected
    /// and immediately reconnected; both tasks go. A CPU with exactly two
    /// remaining tasks, neither targeting a device, was power-cycled for
    /// nothing; both go too. Anything that is not an exact pair is left
    /// alone. Dangling dependency references are pruned afterwards.
    pub fn remove_redundant_tasks(&mut self) {
        self.sort_by_id();
        for device_id in self.all_devices() {
            let slice = self.device_slice(&device_id);
            if let [first, second] = slice[..] {
                let same_cpu = match (self.task(first), self.task(second)) {
                    (Some(a), Some(b)) => a.cpu_id == b.cpu_id,
                    _ => false,
                };
                if same_cpu {
                    self.remove(first);
                    self.remove(second);
                }
            }
        }
        for cpu_id in self.all_cpus() {
            let slice = self.cpu_slice(&cpu_id);
            if let [first, second] = slice[..] {
                let power_only = match (self.task(first), self.task(second)) {
                    (Some(a), Some(b)) => a.device_id.is_none() && b.device_id.is_none(),
                    _ => false,
                };
                if power_only {
                    self.remove(first);
                    self.remove(second);
                }
            }
        }
        self.remove_invalid_dependencies();
    }

    /// Resolve ordering constraints: device-sharing order, then
    /// shutdown-before-connect, then disconnect-before-boot. The pass
    /// order decides which edges survive the later transitive reduction
    /// and must not change.
    pub fn complete_device_dependencies(&mut self) {
        self.sort_by_id();
        self.create_device_dependencies();
        self.create_shutdown_dependencies();
        self.create_boot_dependencies();
    }

    /// A device touched more than once in one plan is handled in id
    /// order: each task on it depends on the previous task on the same
    /// device.
    fn create_device_dependencies(&mut self) {
        let mut edges = Vec::new();
        for device_id in self.all_devices() {
            let slice = self.device_slice(&device_id);
            for pair in slice.windows(2) {
                edges.push((pair[1], pair[0]));
            }
        }
        self.add_dependencies(edges);
    }

    /// A connect on a CPU that is being shut down in this plan waits for
    /// the shutdown.
    fn create_shutdown_dependencies(&mut self) {
        let shutdown_tasks = self.shutdown_tasks();
        let mut edges = Vec::new();
        for task in &self.tasks {
            if task.operation == Operation::Connect {
                if let Some(&shutdown) = shutdown_tasks.get(&task.cpu_id) {
                    edges.push((task.id, shutdown));
                }
            }
        }
        self.add_dependencies(edges);
    }

    /// A boot waits for every disconnect on its CPU.
    fn create_boot_dependencies(&mut self) {
        let boot_tasks = self.boot_tasks();
        let mut edges = Vec::new();
        for task in &self.tasks {
            if task.operation == Operation::Disconnect {
                if let Some(&boot) = boot_tasks.get(&task.cpu_id) {
                    edges.push((boot, task.id));
                }
            }
        }
        self.add_dependencies(edges);
    }

    /// Append each (task, dependency) edge, skipping edges the task
    /// already carries. Presence is checked by task id, so repeated
    /// resolver passes cannot duplicate an edge.
    fn add_dependencies(&mut self, edges: Vec<(TaskId, TaskId)>) {
        for (task_id, dep_id) in edges {
            if let Some(task) = self.task_mut(task_id) {
                if !task.dependencies.contains(&dep_id) {
                    task.dependencies.push(dep_id);
                }
            }
        }
    }

    /// Drop dependency references to tasks no longer in the plan.
    pub fn remove_invalid_dependencies(&mut self) {
        self.sort_by_id();
        let ids: HashSet<TaskId> = self.tasks.iter().map(|task| task.id).collect();
        for task in &mut self.tasks {
            task.dependencies.retain(|dep| ids.contains(dep));
        }
    }

    /// Transitive reduction: walking tasks from the newest down, drop any
    /// direct dependency already implied by another dependency's
    /// transitive closure, keeping only the nearest causal edges.
    pub fn remove_indirect_dependencies(&mut self) {
        self.sort_by_id();
        for index in (0..self.tasks.len()).rev() {
            let direct = self.tasks[index].dependencies.clone();
            let mut implied = HashSet::new();
            for dep in &direct {
                implied.extend(self.all_dependencies(*dep));
            }
            self.tasks[index]
                .dependencies
                .retain(|dep| !implied.contains(dep));
        }
    }

    /// Flattened transitive closure of a task's dependencies, expanded
    /// depth first. Duplicates are possible; callers treat the result as
    /// a set.
    pub fn all_dependencies(&self, id: TaskId) -> Vec<TaskId> {
        let mut closure = Vec::new();
        if let Some(task) = self.task(id) {
            for dep in &task.dependencies {
                closure.push(*dep);
                closure.extend(self.all_dependencies(*dep));
            }
        }
        closure
    }
}
