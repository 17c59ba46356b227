//! Reactions to device lifecycle and device-originated notifications.
//!
//! The `apply_*` and `purge_*` functions run inline on the event loop and
//! mutate the database directly, then mirror the change into the cluster
//! views. The async ones run on workers.

use tracing::{debug, info, trace, warn};

use super::ForwardingRulesManager;
use crate::model::{Flow, InstallEntry, NodeId, Status, StatusCode};
use crate::programmer::DispatchMode;
use crate::static_flows::{status_success, status_text, STATIC_FLOW_GROUP, STATUS_NODE_DOWN};
use crate::telemetry::TelemetryEvent;

impl ForwardingRulesManager {
    /// Event loop: records or drops one install variant.
    pub(crate) fn apply_database_update(&self, entry: InstallEntry, add: bool) {
        let original = {
            let mut db = self.inner.database.write();
            if add {
                db.add_or_update(entry.clone());
            } else {
                db.remove(&entry);
            }
            db.lookup_original(entry.original()).cloned()
        };
        self.inner.shared.publish(&entry, add, original);
    }

    /// Event loop: forgets everything installed on a device that went away.
    pub(crate) fn purge_node(&self, node: &NodeId) {
        let preserve = self.inner.config.preserve_on_node_down;
        let purged = self.inner.database.write().purge_node(node, preserve);
        self.inner.shared.purge(&purged, preserve);
        info!(node = %node, entries = purged.len(), "Cleaned flow database for node");
        self.inner.telemetry.emit(TelemetryEvent::NodePurged {
            node: node.clone(),
            entries: purged.len(),
        });

        let mut statics = self.inner.static_flows.lock();
        statics.retain(|_, config| !(config.node() == node && config.install_in_hw() && config.is_internal()));
        for config in statics.iter_mut() {
            if config.node() == node && config.install_in_hw() {
                config.set_status(STATUS_NODE_DOWN);
            }
        }
    }

    /// Event loop: a device rejected an asynchronous request.
    pub(crate) fn apply_error_report(&self, node: &NodeId, request_id: u64, error: Option<String>) {
        let error = error.unwrap_or_else(|| "Not provided".to_string());

        let failed = {
            let db = self.inner.database.read();
            db.find_by_request_id(node, request_id).cloned()
        };
        let Some(failed) = failed else {
            debug!(node = %node, request_id, "Error report for unknown request");
            return;
        };
        self.apply_database_update(failed.clone(), false);
        warn!(entry = %failed, request_id, error = %error, "Device failed to program flow entry");

        if failed.original().group() == Some(STATIC_FLOW_GROUP) {
            if let Some(name) = failed.original().name() {
                if let Some(config) = self.inner.static_flows.lock().get_mut(name, node) {
                    config.set_status(error.clone());
                }
            }
        }

        self.inner.telemetry.emit(TelemetryEvent::RequestFailed {
            node: node.clone(),
            request_id,
        });
        for listener in self.listeners() {
            listener.request_failed(request_id, &error);
        }
    }

    /// Event loop: a device dropped a flow on its own.
    pub(crate) fn apply_flow_removed(&self, node: &NodeId, flow: &Flow) {
        let removed = {
            let db = self.inner.database.read();
            db.find_by_installed_flow(node, flow).cloned()
        };
        let Some(removed) = removed else {
            trace!(node = %node, flow = %flow, "Removal notice for unknown flow");
            return;
        };
        self.apply_database_update(removed.clone(), false);
        debug!(entry = %removed, "Flow removed by device");

        if let Some(name) = removed.original().name() {
            if let Some(config) = self.inner.static_flows.lock().get_mut(name, node) {
                config.toggle_installation();
                config.set_status(status_success());
            }
        }

        let status = Status::new(StatusCode::Gone, "Flow removed by device");
        for listener in self.listeners() {
            listener.flow_removed(removed.original(), &status);
        }
    }

    /// Worker: replays static flows that are not yet programmed on `node`.
    pub(crate) async fn replay_static_flows(&self, node: &NodeId) {
        let pending: Vec<_> = self
            .inner
            .static_flows
            .lock()
            .for_node(node)
            .filter(|config| config.install_in_hw() && !config.is_installed_ok())
            .cloned()
            .collect();
        if pending.is_empty() {
            return;
        }
        info!(node = %node, flows = pending.len(), "Installing static flows on node");

        for config in pending {
            let status = self
                .install_flow_entry(&config.flow_entry(), DispatchMode::Async)
                .await;
            if let Some(stored) = self
                .inner
                .static_flows
                .lock()
                .get_mut(config.name(), config.node())
            {
                stored.set_status(status_text(&status));
            }
        }
    }
}
