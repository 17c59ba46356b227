//! Device and port identifiers.

use std::fmt;

/// Identifier of a managed network device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Port `number` on this device.
    pub fn port(&self, number: u32) -> PortId {
        PortId::new(self.clone(), number)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A port on a specific device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId {
    node: NodeId,
    number: u32,
}

impl PortId {
    pub fn new(node: NodeId, number: u32) -> Self {
        Self { node, number }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.number)
    }
}
