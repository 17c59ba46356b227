//! Cluster-wide copies of the original and installed views.
//!
//! Each controller's [`FlowDatabase`](crate::database::FlowDatabase) only
//! holds entries for devices it owns. The owner mirrors every change into
//! two replicated tables so other controllers can run their conflict checks
//! against devices attached elsewhere.

use crate::cluster::{CacheMode, ClusterError, ClusterMember, ReplicatedTable};
use crate::model::{FlowEntry, FlowKey, InstallEntry, InstallKey, NodeId};

/// Replicated table of requested entries.
pub const ORIGINAL_VIEW_TABLE: &str = "frm.originalSwView";

/// Replicated table of installed variants.
pub const INSTALLED_VIEW_TABLE: &str = "frm.installedSwView";

#[derive(Debug)]
pub struct SharedFlowViews {
    original: ReplicatedTable<FlowKey, FlowEntry>,
    installed: ReplicatedTable<InstallKey, InstallEntry>,
}

impl SharedFlowViews {
    pub fn open(member: &ClusterMember) -> Result<Self, ClusterError> {
        Ok(Self {
            original: member.table(ORIGINAL_VIEW_TABLE, CacheMode::Transactional)?,
            installed: member.table(INSTALLED_VIEW_TABLE, CacheMode::Transactional)?,
        })
    }

    pub fn original(&self, entry: &FlowEntry) -> Option<FlowEntry> {
        self.original.get(&entry.key())
    }

    pub fn installed(&self, key: &InstallKey) -> Option<InstallEntry> {
        self.installed.get(key)
    }

    /// Installed variants on `node`.
    pub fn node_installed(&self, node: &NodeId) -> Vec<InstallEntry> {
        self.installed
            .values()
            .into_iter()
            .filter(|entry| entry.node() == node)
            .collect()
    }

    /// Installed variants of `group` on devices matching `on_node`.
    pub fn group_installed(&self, group: &str, on_node: impl Fn(&NodeId) -> bool) -> Vec<InstallEntry> {
        self.installed
            .values()
            .into_iter()
            .filter(|entry| entry.original().group() == Some(group) && on_node(entry.node()))
            .collect()
    }

    /// Owner side: mirrors one change of the local database. `original` is
    /// the requested entry still recorded locally after the change, if any.
    pub(crate) fn publish(&self, entry: &InstallEntry, add: bool, original: Option<FlowEntry>) {
        if add {
            self.installed.put(entry.key(), entry.clone());
        } else {
            self.installed.remove(&entry.key());
        }
        match original {
            Some(original) => self.original.put(original.key(), original),
            None => {
                self.original.remove(&entry.original().key());
            }
        }
    }

    /// Owner side: mirrors a device purge.
    pub(crate) fn purge(&self, purged: &[InstallEntry], preserve_originals: bool) {
        for entry in purged {
            self.installed.remove(&entry.key());
            if !preserve_originals {
                self.original.remove(&entry.original().key());
            }
        }
    }
}
