//! Replicated key/value tables with change callbacks.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::ControllerId;

/// Consistency mode requested when a table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Transactional,
    NonTransactional,
}

/// Receives table change notifications.
///
/// `origin_local` is true when the member that registered the listener made
/// the change itself. Callbacks run on the writer's task and must not block.
pub trait CacheListener<K, V>: Send + Sync {
    fn entry_updated(&self, key: &K, value: &V, table: &str, origin_local: bool);

    fn entry_deleted(&self, _key: &K, _table: &str, _origin_local: bool) {}
}

pub(super) struct TableShared<K, V> {
    name: String,
    mode: CacheMode,
    entries: DashMap<K, V>,
    listeners: RwLock<Vec<(ControllerId, Arc<dyn CacheListener<K, V>>)>>,
}

impl<K, V> TableShared<K, V>
where
    K: Eq + Hash,
{
    pub(super) fn new(name: &str, mode: CacheMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            entries: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

/// One member's handle on a replicated table.
pub struct ReplicatedTable<K, V> {
    shared: Arc<TableShared<K, V>>,
    member: ControllerId,
}

impl<K, V> ReplicatedTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(super) fn new(shared: Arc<TableShared<K, V>>, member: ControllerId) -> Self {
        Self { shared, member }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn mode(&self) -> CacheMode {
        self.shared.mode
    }

    /// Stores `value` and notifies every subscribed member.
    pub fn put(&self, key: K, value: V) {
        self.shared.entries.insert(key.clone(), value.clone());
        for (owner, listener) in self.listeners() {
            listener.entry_updated(&key, &value, &self.shared.name, owner == self.member);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.shared.entries.get(key).map(|v| v.value().clone())
    }

    /// Removes `key`, notifying subscribers only if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let (key, value) = self.shared.entries.remove(key)?;
        for (owner, listener) in self.listeners() {
            listener.entry_deleted(&key, &self.shared.name, owner == self.member);
        }
        Some(value)
    }

    /// Snapshot of the values currently stored.
    pub fn values(&self) -> Vec<V> {
        self.shared.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shared.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Registers `listener` on behalf of this member.
    pub fn subscribe(&self, listener: Arc<dyn CacheListener<K, V>>) {
        self.shared
            .listeners
            .write()
            .push((self.member.clone(), listener));
    }

    // Callbacks may write to other tables; never hold the listener lock across them.
    fn listeners(&self) -> Vec<(ControllerId, Arc<dyn CacheListener<K, V>>)> {
        self.shared.listeners.read().clone()
    }
}

impl<K, V> Clone for ReplicatedTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            member: self.member.clone(),
        }
    }
}

impl<K, V> fmt::Debug for ReplicatedTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedTable")
            .field("name", &self.shared.name)
            .field("mode", &self.shared.mode)
            .field("member", &self.member)
            .finish()
    }
}
