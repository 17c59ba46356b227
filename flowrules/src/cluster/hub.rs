//! In-process table transport.

use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use super::table::{CacheMode, ReplicatedTable, TableShared};
use super::ControllerId;

/// Errors from the cluster table layer.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A table already exists under this name with different key/value types.
    #[error("Replicated table '{0}' exists with a different key/value type")]
    TypeMismatch(String),
}

/// Shared registry of replicated tables.
#[derive(Default)]
pub struct ClusterHub {
    tables: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ClusterHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Joins the hub as controller `id`.
    pub fn join(self: &Arc<Self>, id: ControllerId) -> ClusterMember {
        ClusterMember {
            hub: Arc::clone(self),
            id,
        }
    }
}

/// A controller's membership in a [`ClusterHub`].
#[derive(Clone)]
pub struct ClusterMember {
    hub: Arc<ClusterHub>,
    id: ControllerId,
}

impl ClusterMember {
    pub fn my_address(&self) -> &ControllerId {
        &self.id
    }

    /// Returns the named table, creating it with `mode` on first use.
    pub fn table<K, V>(&self, name: &str, mode: CacheMode) -> Result<ReplicatedTable<K, V>, ClusterError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let erased = self
            .hub
            .tables
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Arc::new(TableShared::<K, V>::new(name, mode))) as Arc<dyn Any + Send + Sync>
            })
            .value()
            .clone();

        let shared = erased
            .downcast_ref::<Arc<TableShared<K, V>>>()
            .cloned()
            .ok_or_else(|| ClusterError::TypeMismatch(name.to_string()))?;

        Ok(ReplicatedTable::new(shared, self.id.clone()))
    }
}
