//! Operator-configured ("static") flows.
//!
//! Static flows are named flow definitions kept by the manager independently
//! of whether they are currently programmed. They are replayed when their
//! device connects and annotated with a human readable status.

use std::collections::BTreeMap;

use crate::model::{Action, Flow, FlowEntry, Match, MatchField, NodeId, Status, StatusCode};

/// Group of user-defined static flows.
pub const STATIC_FLOW_GROUP: &str = "__StaticFlows__";

/// Group of controller-generated static flows.
pub const INTERNAL_STATIC_FLOW_GROUP: &str = "__InternalStaticFlows__";

/// Controller-generated flow names start and end with this marker.
pub const INTERNAL_NAME_MARKER: &str = "__";

pub const STATUS_NODE_DOWN: &str = "Node is Down";
pub const STATUS_PORT_REMOVED: &str = "Port removed";
pub const STATUS_CONTAINER_MODE: &str = "Removed from node because in container mode";

/// Status text of a static flow that is programmed as configured.
pub fn status_success() -> String {
    StatusCode::Success.to_string()
}

/// Status text recorded on a static flow after an operation on it.
pub(crate) fn status_text(status: &Status) -> String {
    if status.is_success() {
        status_success()
    } else {
        status.description()
    }
}

/// A named static flow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFlowConfig {
    name: String,
    node: NodeId,
    flow: Flow,
    install_in_hw: bool,
    status: String,
    dynamic: bool,
}

impl StaticFlowConfig {
    pub fn new(name: impl Into<String>, node: NodeId, flow: Flow) -> Self {
        Self {
            name: name.into(),
            node,
            flow,
            install_in_hw: true,
            status: String::new(),
            dynamic: false,
        }
    }

    pub fn with_install_in_hw(mut self, install: bool) -> Self {
        self.install_in_hw = install;
        self
    }

    /// Marks the flow as generated at runtime rather than configured.
    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn install_in_hw(&self) -> bool {
        self.install_in_hw
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_internal(&self) -> bool {
        self.name.len() > 2 * INTERNAL_NAME_MARKER.len()
            && self.name.starts_with(INTERNAL_NAME_MARKER)
            && self.name.ends_with(INTERNAL_NAME_MARKER)
    }

    pub fn is_installed_ok(&self) -> bool {
        self.status == status_success()
    }

    pub fn toggle_installation(&mut self) {
        self.install_in_hw = !self.install_in_hw;
    }

    pub fn group(&self) -> &'static str {
        if self.is_internal() {
            INTERNAL_STATIC_FLOW_GROUP
        } else {
            STATIC_FLOW_GROUP
        }
    }

    /// The flow entry this configuration programs.
    pub fn flow_entry(&self) -> FlowEntry {
        FlowEntry::new(self.node.clone(), self.flow.clone())
            .with_name(self.name.clone())
            .with_group(self.group())
            .with_internal(self.is_internal())
    }

    pub fn is_for(&self, name: &str, node: &NodeId) -> bool {
        self.name == name && &self.node == node
    }

    /// Same definition, ignoring status text.
    pub fn same_definition(&self, other: &StaticFlowConfig) -> bool {
        self.name == other.name
            && self.node == other.node
            && self.flow == other.flow
            && self.install_in_hw == other.install_in_hw
    }

    /// Controller-generated flows installed on a device in proactive mode.
    pub fn proactive_defaults(node: &NodeId) -> Vec<StaticFlowConfig> {
        let punt = vec![Action::Controller];
        vec![
            StaticFlowConfig::new(
                internal_name("Punt ARP"),
                node.clone(),
                Flow::new(Match::new().with(MatchField::DlType(ETHERTYPE_ARP)), punt.clone()).with_priority(1),
            ),
            StaticFlowConfig::new(
                internal_name("Punt LLDP"),
                node.clone(),
                Flow::new(Match::new().with(MatchField::DlType(ETHERTYPE_LLDP)), punt).with_priority(1),
            ),
            StaticFlowConfig::new(
                internal_name("Catch-All Drop"),
                node.clone(),
                Flow::new(Match::new(), vec![Action::Drop]).with_priority(0),
            ),
        ]
    }
}

const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_LLDP: u16 = 0x88cc;

fn internal_name(name: &str) -> String {
    format!("{INTERNAL_NAME_MARKER}{name}{INTERNAL_NAME_MARKER}")
}

/// Static flows in configuration order.
#[derive(Debug, Default)]
pub struct StaticFlowRegistry {
    configs: BTreeMap<u64, StaticFlowConfig>,
    next_ordinal: u64,
}

impl StaticFlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a configuration and returns its ordinal.
    pub fn insert(&mut self, config: StaticFlowConfig) -> u64 {
        self.next_ordinal += 1;
        self.configs.insert(self.next_ordinal, config);
        self.next_ordinal
    }

    pub fn contains(&self, name: &str, node: &NodeId) -> bool {
        self.get(name, node).is_some()
    }

    pub fn get(&self, name: &str, node: &NodeId) -> Option<&StaticFlowConfig> {
        self.configs.values().find(|c| c.is_for(name, node))
    }

    pub fn get_mut(&mut self, name: &str, node: &NodeId) -> Option<&mut StaticFlowConfig> {
        self.configs.values_mut().find(|c| c.is_for(name, node))
    }

    /// Replaces the configuration with the same name and node, keeping its position.
    pub fn replace(&mut self, config: StaticFlowConfig) -> bool {
        match self.get_mut(&config.name.clone(), &config.node.clone()) {
            Some(slot) => {
                *slot = config;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str, node: &NodeId) -> Option<StaticFlowConfig> {
        let ordinal = self
            .configs
            .iter()
            .find(|(_, c)| c.is_for(name, node))
            .map(|(ordinal, _)| *ordinal)?;
        self.configs.remove(&ordinal)
    }

    pub fn retain(&mut self, keep: impl FnMut(&u64, &mut StaticFlowConfig) -> bool) {
        self.configs.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StaticFlowConfig> {
        self.configs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StaticFlowConfig> {
        self.configs.values_mut()
    }

    pub fn for_node<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a StaticFlowConfig> + 'a {
        self.configs.values().filter(move |c| c.node() == node)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
