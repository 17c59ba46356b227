//! Requested and installed flow entries.

use std::fmt;

use super::container_flow::ContainerFlow;
use super::flow::Flow;
use super::matching::Match;
use super::node::NodeId;

/// Identity of a flow on a device: two entries with the same key cannot
/// coexist on that device, whatever their actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub node: NodeId,
    pub matching: Match,
    pub priority: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} priority={}", self.node, self.matching, self.priority)
    }
}

/// A flow requested for a device, optionally named and grouped.
///
/// Equality is structural. Use [`FlowEntry::key`] for device identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowEntry {
    group: Option<String>,
    name: Option<String>,
    flow: Flow,
    node: NodeId,
    internal: bool,
}

impl FlowEntry {
    pub fn new(node: NodeId, flow: Flow) -> Self {
        Self {
            group: None,
            name: None,
            flow,
            node,
            internal: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Marks the entry as controller generated.
    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn key(&self) -> FlowKey {
        FlowKey {
            node: self.node.clone(),
            matching: self.flow.matching().clone(),
            priority: self.flow.priority(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut Flow {
        &mut self.flow
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Copy of this entry carrying a different flow.
    pub fn with_flow(&self, flow: Flow) -> Self {
        Self {
            flow,
            ..self.clone()
        }
    }

    /// The entry as it must be programmed inside `container_flow`, or `None`
    /// when the container flow does not admit it.
    pub fn merged_with(&self, container_flow: &ContainerFlow) -> Option<FlowEntry> {
        let matching = self.flow.matching().intersection(container_flow.matching())?;
        let mut merged = self.clone();
        merged.flow.set_matching(matching);
        Some(merged)
    }
}

impl fmt::Display for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowEntry[name={}, group={}, node={}, {}]",
            self.name.as_deref().unwrap_or("-"),
            self.group.as_deref().unwrap_or("-"),
            self.node,
            self.flow
        )
    }
}

/// Identity of an install variant: the merged flow key plus the container
/// flow it was derived under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallKey {
    pub flow: FlowKey,
    pub container_flow: Option<ContainerFlow>,
}

/// A concrete variant of a requested entry, ready for (or already on) a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    original: FlowEntry,
    install: FlowEntry,
    container_flow: Option<ContainerFlow>,
    request_id: u64,
}

impl InstallEntry {
    /// Derives the install variant of `original` under `container_flow`.
    ///
    /// Without a container flow the install entry equals the original.
    /// Returns `None` if the container flow and the requested match are disjoint.
    pub fn new(original: FlowEntry, container_flow: Option<ContainerFlow>) -> Option<Self> {
        let install = match &container_flow {
            Some(cf) => original.merged_with(cf)?,
            None => original.clone(),
        };
        Some(Self {
            original,
            install,
            container_flow,
            request_id: 0,
        })
    }

    pub fn key(&self) -> InstallKey {
        InstallKey {
            flow: self.install.key(),
            container_flow: self.container_flow.clone(),
        }
    }

    pub fn node(&self) -> &NodeId {
        self.install.node()
    }

    pub fn original(&self) -> &FlowEntry {
        &self.original
    }

    pub fn install(&self) -> &FlowEntry {
        &self.install
    }

    pub fn container_flow(&self) -> Option<&ContainerFlow> {
        self.container_flow.as_ref()
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn set_request_id(&mut self, request_id: u64) {
        self.request_id = request_id;
    }
}

impl fmt::Display for InstallEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container_flow {
            Some(cf) => write!(f, "{} in {}", self.install, cf),
            None => write!(f, "{}", self.install),
        }
    }
}
