//! The container this manager instance programs flows for.
//!
//! A container owns a set of container flows (traffic slices) and optionally
//! a subset of device ports. The default container sees all ports and, while
//! a non-default container exists, is locked out of programming non-internal
//! entries ("container mode").

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::model::{ContainerFlow, FlowEntry, InstallEntry, PortId, UpdateType};

/// Name of the container that owns the whole network.
pub const DEFAULT_CONTAINER_NAME: &str = "default";

/// Live view of container membership and container flows.
#[derive(Debug)]
pub struct ContainerView {
    name: String,
    container_flows: RwLock<Vec<ContainerFlow>>,
    ports: RwLock<Option<HashSet<PortId>>>,
    container_mode: AtomicBool,
}

impl ContainerView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container_flows: RwLock::new(Vec::new()),
            ports: RwLock::new(None),
            container_mode: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CONTAINER_NAME
    }

    pub fn container_flows(&self) -> Vec<ContainerFlow> {
        self.container_flows.read().clone()
    }

    pub fn set_container_flows(&self, flows: Vec<ContainerFlow>) {
        *self.container_flows.write() = flows;
    }

    /// Applies a container-flow change notification to the view.
    pub fn apply_container_flow_update(
        &self,
        previous: Option<&ContainerFlow>,
        current: &ContainerFlow,
        update: UpdateType,
    ) {
        let mut flows = self.container_flows.write();
        match update {
            UpdateType::Added => {
                if !flows.contains(current) {
                    flows.push(current.clone());
                }
            }
            UpdateType::Removed => flows.retain(|cf| cf != current),
            UpdateType::Changed => {
                let replaced = previous.and_then(|p| flows.iter().position(|cf| cf == p));
                match replaced {
                    Some(index) => flows[index] = current.clone(),
                    None if !flows.contains(current) => flows.push(current.clone()),
                    None => {}
                }
            }
        }
    }

    /// Restricts the container to `ports`. `None` lifts the restriction.
    pub fn set_ports(&self, ports: Option<HashSet<PortId>>) {
        *self.ports.write() = ports;
    }

    pub fn contains_port(&self, port: &PortId) -> bool {
        match &*self.ports.read() {
            Some(ports) => ports.contains(port),
            None => true,
        }
    }

    pub fn in_container_mode(&self) -> bool {
        self.container_mode.load(Ordering::Acquire)
    }

    pub fn set_container_mode(&self, enabled: bool) {
        self.container_mode.store(enabled, Ordering::Release);
    }

    /// Whether `entry` may be programmed given the container-mode lockout.
    pub fn allows_programming(&self, entry: &FlowEntry) -> bool {
        !self.in_container_mode() || entry.is_internal()
    }

    /// Install variants of `entry`, one per admitting container flow.
    ///
    /// With no container flows configured the entry is its own single variant.
    /// An empty result means the entry conflicts with every container flow.
    pub fn derive_install_entries(&self, entry: &FlowEntry) -> Vec<InstallEntry> {
        let flows = self.container_flows.read();
        if flows.is_empty() {
            return InstallEntry::new(entry.clone(), None).into_iter().collect();
        }
        flows
            .iter()
            .filter(|cf| cf.allows_flow(entry.flow()))
            .filter_map(|cf| InstallEntry::new(entry.clone(), Some(cf.clone())))
            .collect()
    }
}

impl Default for ContainerView {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINER_NAME)
    }
}
