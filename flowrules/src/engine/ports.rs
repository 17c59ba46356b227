//! Output-port editing of named entries and reactions to port changes.

use tracing::{debug, info, warn};

use super::ForwardingRulesManager;
use crate::model::{Action, FlowEntry, NodeId, PortId, Status, StatusCode, UpdateType};
use crate::programmer::DispatchMode;
use crate::static_flows::{status_text, STATUS_PORT_REMOVED};

impl ForwardingRulesManager {
    /// Adds `ports` as output actions of the entry named `flow_name` on `node`.
    pub async fn add_output_port(&self, node: &NodeId, flow_name: &str, ports: &[PortId]) -> Status {
        self.edit_output_ports(node, flow_name, |entry| {
            for port in ports {
                entry.flow_mut().add_action(Action::Output(port.clone()));
            }
        })
        .await
    }

    /// Removes `ports` from the output actions of the entry named `flow_name`.
    pub async fn remove_output_port(&self, node: &NodeId, flow_name: &str, ports: &[PortId]) -> Status {
        self.edit_output_ports(node, flow_name, |entry| {
            for port in ports {
                entry.flow_mut().remove_action(&Action::Output(port.clone()));
            }
        })
        .await
    }

    /// Makes `port` the only output action of the entry named `flow_name`.
    pub async fn replace_output_port(&self, node: &NodeId, flow_name: &str, port: &PortId) -> Status {
        self.edit_output_ports(node, flow_name, |entry| {
            let existing: Vec<PortId> = entry.flow().output_ports().cloned().collect();
            for old in existing {
                entry.flow_mut().remove_action(&Action::Output(old));
            }
            entry.flow_mut().add_action(Action::Output(port.clone()));
        })
        .await
    }

    /// First output port of the entry named `flow_name` on `node`.
    pub fn output_port(&self, node: &NodeId, flow_name: &str) -> Option<PortId> {
        self.named_entry(node, flow_name)
            .and_then(|entry| entry.flow().output_ports().next().cloned())
    }

    async fn edit_output_ports(&self, node: &NodeId, flow_name: &str, edit: impl FnOnce(&mut FlowEntry)) -> Status {
        let Some(current) = self.named_entry(node, flow_name) else {
            return Status::new(
                StatusCode::NotFound,
                format!("No flow named {} on node {}", flow_name, node),
            );
        };
        let mut updated = current.clone();
        edit(&mut updated);
        self.modify_flow_entry(&current, &updated, DispatchMode::Sync)
            .await
    }

    fn named_entry(&self, node: &NodeId, flow_name: &str) -> Option<FlowEntry> {
        self.installed_entries_for_node(node)
            .into_iter()
            .map(|entry| entry.original().clone())
            .find(|original| original.name() == Some(flow_name))
    }

    /// Worker: a port appeared on or vanished from a device.
    pub(crate) async fn handle_port_update(&self, port: &PortId, update: UpdateType) {
        match update {
            UpdateType::Removed => self.port_removed(port).await,
            UpdateType::Added => self.port_added(port).await,
            UpdateType::Changed => {}
        }
    }

    async fn port_removed(&self, port: &PortId) {
        let affected: Vec<_> = self
            .installed_entries_for_node(port.node())
            .into_iter()
            .filter(|entry| entry.install().flow().references_port(port))
            .collect();
        if !affected.is_empty() {
            info!(port = %port, entries = affected.len(), "Port removed, removing dependent entries");
        }

        for entry in &affected {
            let status = self.remove_entry_internal(entry, DispatchMode::Async).await;
            if !status.is_success() {
                warn!(variant = %entry, status = %status, "Failed to remove entry for removed port");
            }
        }

        for config in self.inner.static_flows.lock().iter_mut() {
            if config.node() == port.node() && config.flow().references_port(port) {
                config.set_status(STATUS_PORT_REMOVED);
            }
        }
    }

    async fn port_added(&self, port: &PortId) {
        let pending: Vec<_> = self
            .inner
            .static_flows
            .lock()
            .for_node(port.node())
            .filter(|config| {
                config.install_in_hw() && !config.is_installed_ok() && config.flow().references_port(port)
            })
            .cloned()
            .collect();

        for config in pending {
            debug!(port = %port, flow = config.name(), "Port added, installing static flow");
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
