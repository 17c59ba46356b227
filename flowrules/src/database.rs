//! The flow database: what was requested and what is installed.
//!
//! Four views are kept in step:
//!
//! - original view: requested entry by [`FlowKey`],
//! - installed view: install variant by [`InstallKey`],
//! - node index: install variants per device,
//! - group index: install variants per group name.
//!
//! The database itself is not synchronized. The manager wraps it in a lock
//! and routes every mutation through the event loop, so there is exactly one
//! writer at a time.

use std::collections::HashMap;

use crate::model::{Flow, FlowEntry, FlowKey, InstallEntry, InstallKey, NodeId};

#[derive(Debug, Default)]
pub struct FlowDatabase {
    original: HashMap<FlowKey, FlowEntry>,
    installed: HashMap<InstallKey, InstallEntry>,
    by_node: HashMap<NodeId, Vec<InstallEntry>>,
    by_group: HashMap<String, Vec<InstallEntry>>,
}

impl FlowDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entry` in every view, replacing any entry with the same key.
    pub fn add_or_update(&mut self, entry: InstallEntry) {
        let key = entry.key();
        self.original.insert(entry.original().key(), entry.original().clone());

        upsert(self.by_node.entry(entry.node().clone()).or_default(), &entry);
        if let Some(group) = entry.original().group() {
            upsert(self.by_group.entry(group.to_string()).or_default(), &entry);
        }

        self.installed.insert(key, entry);
    }

    /// Removes `entry` (by key) from every view.
    ///
    /// The requested entry stays in the original view while another of its
    /// install variants remains installed.
    pub fn remove(&mut self, entry: &InstallEntry) -> Option<InstallEntry> {
        let key = entry.key();
        let removed = self.installed.remove(&key);

        let node = entry.node();
        if let Some(list) = self.by_node.get_mut(node) {
            list.retain(|e| e.key() != key);
            if list.is_empty() {
                self.by_node.remove(node);
            }
        }
        if let Some(group) = entry.original().group() {
            if let Some(list) = self.by_group.get_mut(group) {
                list.retain(|e| e.key() != key);
                if list.is_empty() {
                    self.by_group.remove(group);
                }
            }
        }

        let original_key = entry.original().key();
        let still_installed = self
            .by_node
            .get(node)
            .is_some_and(|list| list.iter().any(|e| e.original().key() == original_key));
        if !still_installed {
            self.original.remove(&original_key);
        }

        removed
    }

    /// The requested entry with the same (node, match, priority), if any.
    pub fn lookup_original(&self, entry: &FlowEntry) -> Option<&FlowEntry> {
        self.original.get(&entry.key())
    }

    pub fn lookup_installed(&self, key: &InstallKey) -> Option<&InstallEntry> {
        self.installed.get(key)
    }

    pub fn node_entries(&self, node: &NodeId) -> &[InstallEntry] {
        self.by_node.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn group_entries(&self, group: &str) -> &[InstallEntry] {
        self.by_group.get(group).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn installed_entries(&self) -> impl Iterator<Item = &InstallEntry> {
        self.installed.values()
    }

    pub fn original_entries(&self) -> impl Iterator<Item = &FlowEntry> {
        self.original.values()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.by_node.keys()
    }

    /// The installed variant on `node` carrying device request id `request_id`.
    pub fn find_by_request_id(&self, node: &NodeId, request_id: u64) -> Option<&InstallEntry> {
        self.node_entries(node).iter().find(|e| e.request_id() == request_id)
    }

    /// The installed variant on `node` programmed as `flow` (by match and priority).
    pub fn find_by_installed_flow(&self, node: &NodeId, flow: &Flow) -> Option<&InstallEntry> {
        self.node_entries(node).iter().find(|e| {
            let installed = e.install().flow();
            installed.matching() == flow.matching() && installed.priority() == flow.priority()
        })
    }

    /// Drops every install variant on `node`. Requested entries survive only
    /// if `preserve_originals` is set. Returns the purged variants.
    pub fn purge_node(&mut self, node: &NodeId, preserve_originals: bool) -> Vec<InstallEntry> {
        let purged = self.by_node.remove(node).unwrap_or_default();
        for entry in &purged {
            self.installed.remove(&entry.key());
            if let Some(group) = entry.original().group() {
                if let Some(list) = self.by_group.get_mut(group) {
                    list.retain(|e| e.node() != node);
                    if list.is_empty() {
                        self.by_group.remove(group);
                    }
                }
            }
            if !preserve_originals {
                self.original.remove(&entry.original().key());
            }
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    /// True when the installed view and both indexes hold the same entries.
    pub fn is_consistent(&self) -> bool {
        let indexed: usize = self.by_node.values().map(Vec::len).sum();
        if indexed != self.installed.len() {
            return false;
        }
        let by_node_ok = self.by_node.values().flatten().all(|e| {
            self.installed.get(&e.key()) == Some(e) && self.original.contains_key(&e.original().key())
        });
        let by_group_ok = self
            .by_group
            .iter()
            .all(|(group, list)| {
                !list.is_empty()
                    && list.iter().all(|e| {
                        e.original().group() == Some(group.as_str()) && self.installed.get(&e.key()) == Some(e)
                    })
            });
        by_node_ok && by_group_ok
    }
}

fn upsert(list: &mut Vec<InstallEntry>, entry: &InstallEntry) {
    let key = entry.key();
    list.retain(|e| e.key() != key);
    list.push(entry.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ContainerFlow, Match, MatchField};

    fn entry(node: &str, port: u16, group: Option<&str>) -> InstallEntry {
        let flow = Flow::new(Match::new().with(MatchField::TpDst(port)), vec![Action::Drop]);
        let mut original = FlowEntry::new(NodeId::new(node), flow);
        if let Some(group) = group {
            original = original.with_group(group);
        }
        InstallEntry::new(original, None).unwrap()
    }

    #[test]
    fn test_add_indexes_everywhere() {
        let mut db = FlowDatabase::new();
        let e = entry("sw1", 80, Some("web"));
        db.add_or_update(e.clone());

        assert_eq!(db.lookup_installed(&e.key()), Some(&e));
        assert_eq!(db.lookup_original(e.original()), Some(e.original()));
        assert_eq!(db.node_entries(&NodeId::new("sw1")), &[e.clone()]);
        assert_eq!(db.group_entries("web"), &[e]);
        assert!(db.is_consistent());
    }

    #[test]
    fn test_update_replaces_stale_index_entry() {
        let mut db = FlowDatabase::new();
        let mut e = entry("sw1", 80, Some("web"));
        db.add_or_update(e.clone());
        e.set_request_id(17);
        db.add_or_update(e.clone());

        assert_eq!(db.len(), 1);
        assert_eq!(db.node_entries(&NodeId::new("sw1")).len(), 1);
        assert_eq!(db.node_entries(&NodeId::new("sw1"))[0].request_id(), 17);
        assert_eq!(db.group_entries("web")[0].request_id(), 17);
        assert!(db.is_consistent());
    }

    #[test]
    fn test_remove_drops_empty_index_keys() {
        let mut db = FlowDatabase::new();
        let e = entry("sw1", 80, Some("web"));
        db.add_or_update(e.clone());

        assert!(db.remove(&e).is_some());
        assert!(db.is_empty());
        assert!(db.lookup_original(e.original()).is_none());
        assert_eq!(db.nodes().count(), 0);
        assert!(db.group_entries("web").is_empty());
        assert!(db.remove(&e).is_none());
        assert!(db.is_consistent());
    }

    #[test]
    fn test_original_survives_while_a_variant_remains() {
        let mut db = FlowDatabase::new();
        let original = FlowEntry::new(
            NodeId::new("sw1"),
            Flow::new(Match::new().with(MatchField::TpDst(22)), vec![Action::Drop]),
        );
        let a = InstallEntry::new(
            original.clone(),
            Some(ContainerFlow::new(Match::new().with(MatchField::DlVlan(1)))),
        )
        .unwrap();
        let b = InstallEntry::new(
            original.clone(),
            Some(ContainerFlow::new(Match::new().with(MatchField::DlVlan(2)))),
        )
        .unwrap();
        db.add_or_update(a.clone());
        db.add_or_update(b.clone());

        db.remove(&a);
        assert_eq!(db.lookup_original(&original), Some(&original));
        db.remove(&b);
        assert!(db.lookup_original(&original).is_none());
    }

    #[test]
    fn test_purge_node() {
        let mut db = FlowDatabase::new();
        let keep = entry("sw2", 80, Some("web"));
        db.add_or_update(entry("sw1", 80, Some("web")));
        db.add_or_update(entry("sw1", 443, None));
        db.add_or_update(keep.clone());

        let purged = db.purge_node(&NodeId::new("sw1"), false);
        assert_eq!(purged.len(), 2);
        assert_eq!(db.len(), 1);
        assert_eq!(db.group_entries("web"), &[keep]);
        assert_eq!(db.original_entries().count(), 1);
        assert!(db.is_consistent());
    }

    #[test]
    fn test_purge_node_preserving_originals() {
        let mut db = FlowDatabase::new();
        let e = entry("sw1", 80, None);
        db.add_or_update(e.clone());

        db.purge_node(&NodeId::new("sw1"), true);
        assert!(db.is_empty());
        assert_eq!(db.lookup_original(e.original()), Some(e.original()));
    }

    #[test]
    fn test_find_by_request_id_and_flow() {
        let mut db = FlowDatabase::new();
        let mut e = entry("sw1", 80, None);
        e.set_request_id(5);
        db.add_or_update(e.clone());

        let node = NodeId::new("sw1");
        assert_eq!(db.find_by_request_id(&node, 5), Some(&e));
        assert!(db.find_by_request_id(&node, 6).is_none());

        let reported = Flow::new(Match::new().with(MatchField::TpDst(80)), vec![]);
        assert_eq!(db.find_by_installed_flow(&node, &reported), Some(&e));
    }
}
