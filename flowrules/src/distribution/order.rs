use std::fmt;
use std::hash::{Hash, Hasher};

use crate::cluster::ControllerId;
use crate::model::{InstallEntry, UpdateType};

/// A request for the owning controller of a device to apply an operation.
///
/// Two orders are the same order when they name the same install entry
/// (by key), the same operation and the same requesting controller.
#[derive(Debug, Clone)]
pub struct DistributionOrder {
    entry: InstallEntry,
    op: UpdateType,
    requestor: ControllerId,
}

impl DistributionOrder {
    pub fn new(entry: InstallEntry, op: UpdateType, requestor: ControllerId) -> Self {
        Self {
            entry,
            op,
            requestor,
        }
    }

    pub fn entry(&self) -> &InstallEntry {
        &self.entry
    }

    pub fn op(&self) -> UpdateType {
        self.op
    }

    pub fn requestor(&self) -> &ControllerId {
        &self.requestor
    }
}

impl PartialEq for DistributionOrder {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.requestor == other.requestor && self.entry.key() == other.entry.key()
    }
}

impl Eq for DistributionOrder {}

impl Hash for DistributionOrder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry.key().hash(state);
        self.op.hash(state);
        self.requestor.hash(state);
    }
}

impl fmt::Display for DistributionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} from {}", self.op, self.entry, self.requestor)
    }
}
