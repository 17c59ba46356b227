//! Cluster collaborators.
//!
//! The manager needs three things from the cluster layer:
//!
//! - its own [`ControllerId`],
//! - a [`LocalityOracle`] answering "is this device attached to me?",
//! - named [`ReplicatedTable`]s whose updates are delivered to every member
//!   through [`CacheListener`] callbacks.
//!
//! [`ClusterHub`] is an in-process implementation of the table transport:
//! members joined to the same hub see each other's writes immediately. It
//! serves single-process deployments and multi-member tests.

mod hub;
mod table;

use std::fmt;

use crate::model::NodeId;

pub use hub::{ClusterError, ClusterHub, ClusterMember};
pub use table::{CacheListener, CacheMode, ReplicatedTable};

/// Network address of a controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a device is attached to the local controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    NotLocal,
}

/// Answers device-ownership questions for this controller.
pub trait LocalityOracle: Send + Sync {
    fn locality(&self, node: &NodeId) -> Locality;

    fn is_local(&self, node: &NodeId) -> bool {
        self.locality(node) == Locality::Local
    }
}

/// Single-controller deployments own every device.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllLocal;

impl LocalityOracle for AllLocal {
    fn locality(&self, _node: &NodeId) -> Locality {
        Locality::Local
    }
}
