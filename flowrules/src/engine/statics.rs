//! Static flow operations.
//!
//! A static flow is stored in the registry and, when marked for hardware,
//! programmed through the regular install path. The stored status text
//! tracks the outcome of the last programming attempt.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::ForwardingRulesManager;
use crate::model::{NodeId, Status, StatusCode};
use crate::programmer::DispatchMode;
use crate::static_flows::{status_success, status_text, StaticFlowConfig};

const CONTROLLER_FLOW_DELETE: &str = "Invalid operation: Controller generated flow cannot be deleted";
const CONTROLLER_FLOW_MODIFY: &str = "Invalid operation: Controller generated flow cannot be modified";

impl ForwardingRulesManager {
    /// Validates, programs and stores a static flow.
    ///
    /// The configuration is only stored if programming succeeded (or was not
    /// requested).
    pub async fn add_static_flow(&self, config: StaticFlowConfig) -> Status {
        if !config.is_internal() {
            if let Err(status) = self.validate(&config.flow_entry()) {
                let error = format!("Invalid Configuration ({})", status.description());
                warn!(flow = config.name(), node = %config.node(), error = %error, "Static flow rejected");
                return Status::new(StatusCode::BadRequest, error);
            }
        }
        self.add_static_flow_internal(config, false).await
    }

    /// Startup replay of previously configured static flows. Configurations
    /// are kept even when their installation fails.
    pub async fn restore_static_flows(&self, configs: Vec<StaticFlowConfig>) -> Vec<Status> {
        info!(flows = configs.len(), "Restoring static flows");
        let mut statuses = Vec::with_capacity(configs.len());
        for config in configs {
            statuses.push(self.add_static_flow_internal(config, true).await);
        }
        statuses
    }

    async fn add_static_flow_internal(&self, mut config: StaticFlowConfig, restore: bool) -> Status {
        config.set_status(status_success());

        if self.inner.static_flows.lock().contains(config.name(), config.node()) {
            let msg = "Entry with this name on specified switch already exists";
            warn!(flow = config.name(), node = %config.node(), "{}", msg);
            return Status::new(StatusCode::Conflict, msg);
        }

        if config.install_in_hw() {
            let status = self
                .install_flow_entry(&config.flow_entry(), DispatchMode::Sync)
                .await;
            if !status.is_success() {
                config.set_status(status.description());
                if !restore {
                    return status;
                }
            }
        }

        let mut registry = self.inner.static_flows.lock();
        // Another caller may have stored the same name while we were programming.
        if registry.contains(config.name(), config.node()) {
            return Status::new(
                StatusCode::Conflict,
                "Entry with this name on specified switch already exists",
            );
        }
        registry.insert(config);
        Status::success()
    }

    /// Removes a user-configured static flow from its device and the registry.
    pub async fn remove_static_flow(&self, name: &str, node: &NodeId) -> Status {
        let Some(target) = self.static_flow(name, node) else {
            return Status::new(StatusCode::NotFound, "Entry Not Present");
        };
        if target.is_internal() {
            warn!(flow = name, node = %node, "{}", CONTROLLER_FLOW_DELETE);
            return Status::new(StatusCode::NotAcceptable, CONTROLLER_FLOW_DELETE);
        }

        let status = self
            .remove_entry(&target.flow_entry(), DispatchMode::Sync)
            .await;
        if status.is_success() {
            self.inner.static_flows.lock().remove(name, node);
        }
        status
    }

    /// Removal path that also accepts controller-generated flows.
    async fn remove_static_flow_internal(&self, config: &StaticFlowConfig) -> Status {
        if !self.inner.static_flows.lock().contains(config.name(), config.node()) {
            return Status::new(StatusCode::NotFound, "Entry Not Present");
        }
        let status = self
            .uninstall_flow_entry(&config.flow_entry(), DispatchMode::Sync)
            .await;
        if status.is_success() {
            self.inner
                .static_flows
                .lock()
                .remove(config.name(), config.node());
        }
        status
    }

    /// Replaces the static flow with the same name and node as `new_config`.
    pub async fn modify_static_flow(&self, mut new_config: StaticFlowConfig) -> Status {
        if new_config.is_internal() {
            warn!(flow = new_config.name(), "{}", CONTROLLER_FLOW_MODIFY);
            return Status::new(StatusCode::NotAcceptable, CONTROLLER_FLOW_MODIFY);
        }
        if let Err(status) = self.validate(&new_config.flow_entry()) {
            let error = format!("Invalid Configuration ({})", status.description());
            return Status::new(StatusCode::BadRequest, error);
        }

        let Some(old_config) = self.static_flow(new_config.name(), new_config.node()) else {
            let msg = "Attempt to modify a non existing static flow";
            warn!(flow = new_config.name(), node = %new_config.node(), "{}", msg);
            return Status::new(StatusCode::NotFound, msg);
        };
        if old_config.same_definition(&new_config) {
            info!(flow = new_config.name(), "Static flow unchanged, skipping modify");
            return Status::new(StatusCode::Success, "No modification detected");
        }

        let status = if old_config.install_in_hw() {
            self.modify_entry(&old_config.flow_entry(), &new_config.flow_entry(), DispatchMode::Sync)
                .await
        } else {
            Status::new(StatusCode::Success, "Saved in config")
        };

        if status.is_success() {
            new_config.set_status(status_text(&status));
            self.inner.static_flows.lock().replace(new_config);
        }
        status
    }

    /// Installs a static flow that is not programmed, or uninstalls one that is.
    pub async fn toggle_static_flow_status(&self, name: &str, node: &NodeId) -> Status {
        let Some(target) = self.static_flow(name, node) else {
            return Status::new(
                StatusCode::NotFound,
                "Unable to locate the entry. Failed to toggle status",
            );
        };
        if target.is_internal() {
            warn!(flow = name, "{}", CONTROLLER_FLOW_MODIFY);
            return Status::new(StatusCode::NotAcceptable, CONTROLLER_FLOW_MODIFY);
        }

        let entry = target.flow_entry();
        let status = if target.install_in_hw() {
            self.uninstall_flow_entry(&entry, DispatchMode::Sync).await
        } else {
            self.install_flow_entry(&entry, DispatchMode::Sync).await
        };
        if status.is_success() {
            if let Some(stored) = self.inner.static_flows.lock().get_mut(name, node) {
                stored.set_status(status_success());
                stored.toggle_installation();
            }
        }
        status
    }

    /// Installs (`proactive`) or removes the controller-generated flows that
    /// make a device punt ARP and LLDP and drop everything else.
    pub async fn mode_change_notify(&self, node: &NodeId, proactive: bool) {
        info!(
            node = %node,
            mode = if proactive { "proactive" } else { "reactive" },
            "Forwarding mode changed"
        );
        for config in StaticFlowConfig::proactive_defaults(node) {
            let name = config.name().to_string();
            let status = if proactive {
                self.add_static_flow_internal(config, false).await
            } else {
                self.remove_static_flow_internal(&config).await
            };
            if status.is_success() {
                info!(node = %node, flow = %name, proactive, "Updated proactive static flow");
            } else {
                warn!(node = %node, flow = %name, status = %status, "Failed to update proactive static flow");
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All static flows in configuration order.
    pub fn static_flows(&self) -> Vec<StaticFlowConfig> {
        self.inner.static_flows.lock().iter().cloned().collect()
    }

    pub fn static_flow(&self, name: &str, node: &NodeId) -> Option<StaticFlowConfig> {
        self.inner.static_flows.lock().get(name, node).cloned()
    }

    pub fn static_flows_for_node(&self, node: &NodeId) -> Vec<StaticFlowConfig> {
        self.inner
            .static_flows
            .lock()
            .for_node(node)
            .cloned()
            .collect()
    }

    pub fn static_flow_names_for_node(&self, node: &NodeId) -> Vec<String> {
        self.inner
            .static_flows
            .lock()
            .for_node(node)
            .map(|config| config.name().to_string())
            .collect()
    }

    /// Devices with at least one static flow configured.
    pub fn nodes_with_configured_flows(&self) -> Vec<NodeId> {
        let registry = self.inner.static_flows.lock();
        let nodes: BTreeSet<&NodeId> = registry.iter().map(StaticFlowConfig::node).collect();
        nodes.into_iter().cloned().collect()
    }
}
