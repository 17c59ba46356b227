//! Install, modify and remove of requested flow entries.
//!
//! A requested [`FlowEntry`] fans out into one [`InstallEntry`] per admitting
//! container flow. Each operation here reasons about that whole set of
//! variants and delegates per-variant programming to the internal layer.

use tracing::{error, trace, warn};

use super::ForwardingRulesManager;
use crate::model::{Action, FlowEntry, InstallEntry, Status, StatusCode};
use crate::programmer::DispatchMode;
use crate::static_flows::INTERNAL_STATIC_FLOW_GROUP;
use crate::telemetry::TelemetryEvent;

const CONFLICTS_ALL_CONTAINER_FLOWS: &str = "Flow Entry conflicts with all Container Flows";
pub(super) const SAME_MATCH_EXISTS: &str = "A flow with same match and priority exists on the target node";

impl ForwardingRulesManager {
    // =========================================================================
    // Install
    // =========================================================================

    /// Installs `entry` on its device, once per admitting container flow.
    ///
    /// Installing an entry identical to one already installed (same match,
    /// flow and name) succeeds without touching the device.
    pub async fn install_flow_entry(&self, entry: &FlowEntry, mode: DispatchMode) -> Status {
        if self.is_stopping() {
            return stopping();
        }
        if !self.inner.container.allows_programming(entry) {
            return Status::new(StatusCode::NotAcceptable, "Controller in container mode: Install Refused");
        }
        if let Err(status) = self.validate(entry) {
            warn!(entry = %entry, status = %status, "Install rejected");
            return status;
        }
        self.add_entry(entry, mode).await
    }

    pub(crate) async fn add_entry(&self, entry: &FlowEntry, mode: DispatchMode) -> Status {
        if self.is_redundant_install(entry) {
            trace!(entry = %entry, "Entry already installed");
            return Status::new(StatusCode::Success, "Entry is already installed");
        }

        let derived = self.inner.container.derive_install_entries(entry);
        if derived.is_empty() {
            warn!(entry = %entry, "{}", CONFLICTS_ALL_CONTAINER_FLOWS);
            return Status::new(StatusCode::Conflict, CONFLICTS_ALL_CONTAINER_FLOWS);
        }

        let fresh: Vec<InstallEntry> = derived
            .into_iter()
            .filter(|install| {
                let taken = self.installed_entry(&install.key()).is_some();
                if taken {
                    trace!(install = %install, "Skipping variant, already installed");
                }
                !taken
            })
            .collect();
        if fresh.is_empty() {
            warn!(entry = %entry, "{}", SAME_MATCH_EXISTS);
            return Status::new(StatusCode::Conflict, SAME_MATCH_EXISTS);
        }

        let mut first_success = None;
        let mut last_error = None;
        for install in fresh {
            let status = self.add_entry_internal(install, mode).await;
            if status.is_success() {
                first_success.get_or_insert(status);
            } else {
                last_error = Some(status);
            }
        }
        first_success
            .or(last_error)
            .unwrap_or_else(|| Status::from(StatusCode::Undefined))
    }

    /// Same requested entry already recorded, with at least one variant on
    /// the device. An original kept across a device outage does not count.
    fn is_redundant_install(&self, entry: &FlowEntry) -> bool {
        let same_original = self
            .original_entry(entry)
            .is_some_and(|existing| existing.flow() == entry.flow() && existing.name() == entry.name());
        same_original
            && self
                .inner
                .container
                .derive_install_entries(entry)
                .iter()
                .any(|variant| self.installed_entry(&variant.key()).is_some())
    }

    /// Checks actions and ports against this container and the entry's device.
    pub(crate) fn validate(&self, entry: &FlowEntry) -> Result<(), Status> {
        let container = &self.inner.container;
        let flow = entry.flow();

        if !container.is_default() && flow.actions().iter().any(Action::is_flood) {
            return Err(Status::new(
                StatusCode::BadRequest,
                format!("Flood actions are not allowed in container {}", container.name()),
            ));
        }
        for port in flow.referenced_ports() {
            if port.node() != entry.node() {
                return Err(Status::new(
                    StatusCode::BadRequest,
                    format!("Port {} does not belong to node {}", port, entry.node()),
                ));
            }
            if !container.contains_port(port) {
                return Err(Status::new(
                    StatusCode::BadRequest,
                    format!("Port {} is not part of container {}", port, container.name()),
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes every installed variant of `entry`.
    pub async fn uninstall_flow_entry(&self, entry: &FlowEntry, mode: DispatchMode) -> Status {
        if self.is_stopping() {
            return stopping();
        }
        if !self.inner.container.allows_programming(entry) {
            return Status::new(StatusCode::NotAcceptable, "Controller in container mode: Uninstall Refused");
        }
        self.remove_entry(entry, mode).await
    }

    pub(crate) async fn remove_entry(&self, entry: &FlowEntry, mode: DispatchMode) -> Status {
        let derived = self.inner.container.derive_install_entries(entry);
        let only_variant = derived.len() == 1;

        let mut removed_any = false;
        let mut last_error = None;
        for target in derived {
            let installed = match self.installed_entry(&target.key()) {
                Some(installed) => installed,
                None => {
                    trace!(variant = %target, "Variant not installed, nothing to remove");
                    if only_variant {
                        return Status::success();
                    }
                    continue;
                }
            };

            let status = self.remove_entry_internal(&installed, mode).await;
            if status.is_success() {
                removed_any = true;
            } else {
                if only_variant {
                    return status;
                }
                last_error = Some(status);
            }
        }

        if removed_any {
            return Status::success();
        }
        last_error.unwrap_or_else(|| Status::new(StatusCode::Success, "Entry is not installed"))
    }

    /// Removes every entry of `group`.
    ///
    /// In [`DispatchMode::Async`] the removals are sent without waiting for
    /// device confirmation and the call reports success.
    pub async fn uninstall_flow_entry_group(&self, group: &str, mode: DispatchMode) -> Status {
        if group.is_empty() {
            return Status::new(StatusCode::BadRequest, "Invalid group name");
        }
        if group == INTERNAL_STATIC_FLOW_GROUP {
            return Status::new(StatusCode::BadRequest, "Internal static flows group cannot be deleted");
        }
        if self.is_stopping() {
            return stopping();
        }
        if self.inner.container.in_container_mode() {
            return Status::new(StatusCode::NotAcceptable, "Controller in container mode: Group Uninstall Refused");
        }

        let mut failed = 0usize;
        let mut last_error = None;
        for entry in self.flow_entries_for_group(group) {
            let status = self.remove_entry(&entry, mode).await;
            if !status.is_success() {
                failed += 1;
                last_error = Some(status);
            }
        }

        if mode.is_async() {
            return Status::success();
        }
        match last_error {
            Some(err) => {
                warn!(group, failed, "Not all flows of group were removed");
                Status::new(
                    StatusCode::InternalError,
                    format!("Not all the flows were removed: {}", err.description()),
                )
            }
            None => Status::success(),
        }
    }

    // =========================================================================
    // Modify
    // =========================================================================

    /// Replaces `current` with `new` on the same device.
    pub async fn modify_flow_entry(&self, current: &FlowEntry, new: &FlowEntry, mode: DispatchMode) -> Status {
        if self.is_stopping() {
            return stopping();
        }
        if !self.inner.container.allows_programming(current) || !self.inner.container.allows_programming(new) {
            return Status::new(StatusCode::NotAcceptable, "Controller in container mode: Modify Refused");
        }
        if let Err(status) = self.validate(new) {
            warn!(entry = %new, status = %status, "Modify rejected");
            return status;
        }
        self.modify_entry(current, new, mode).await
    }

    /// Modifies the entry with the same (node, match, priority) as `new`, or
    /// installs `new` when there is none.
    pub async fn modify_or_add_flow_entry(&self, new: &FlowEntry, mode: DispatchMode) -> Status {
        match self.original_entry(new) {
            Some(current) => self.modify_flow_entry(&current, new, mode).await,
            None => self.install_flow_entry(new, mode).await,
        }
    }

    pub(crate) async fn modify_entry(&self, current: &FlowEntry, new: &FlowEntry, mode: DispatchMode) -> Status {
        if current.node() != new.node() || current.name() != new.name() {
            return Status::new(StatusCode::NotAcceptable, "Modify: Incompatible Flow Entries");
        }
        if current.flow() == new.flow() {
            return Status::new(StatusCode::Success, "Modify skipped as flows are the same");
        }

        let current_key = current.key();
        let owner_conflict = self
            .original_entry(new)
            .is_some_and(|owner| owner.key() != current_key);
        if owner_conflict {
            let msg = "Operation Rejected: Another flow with same match and priority exists on the target node";
            warn!(current = %current, new = %new, "{}", msg);
            return Status::new(StatusCode::Conflict, msg);
        }

        let old_variants = self.inner.container.derive_install_entries(current);
        let new_variants = self.inner.container.derive_install_entries(new);
        if new_variants.is_empty() {
            warn!(entry = %new, "{}", CONFLICTS_ALL_CONTAINER_FLOWS);
            return Status::new(StatusCode::Conflict, CONFLICTS_ALL_CONTAINER_FLOWS);
        }

        // A new variant colliding with a variant owned by a different
        // requested entry cannot be paired with an old one.
        let (safe, collided): (Vec<InstallEntry>, Vec<InstallEntry>) =
            new_variants.iter().cloned().partition(|variant| {
                self.installed_entry(&variant.key())
                    .map_or(true, |existing| existing.original().key() == current_key)
            });

        if old_variants.len() != new_variants.len() || !collided.is_empty() {
            self.modify_decoupled(current, &old_variants, safe, mode).await
        } else {
            self.modify_in_place(current, &old_variants, &new_variants, mode)
                .await
        }
    }

    /// Removes all old variants, then adds the non-colliding new ones.
    async fn modify_decoupled(
        &self,
        current: &FlowEntry,
        old_variants: &[InstallEntry],
        safe: Vec<InstallEntry>,
        mode: DispatchMode,
    ) -> Status {
        trace!(entry = %current, "Modify requires remove and add");
        for old in old_variants {
            let status = self.remove_entry_internal(old, mode).await;
            if !status.is_success() {
                warn!(variant = %old, status = %status, "Failed to remove old variant during modify");
            }
        }

        let added = safe.len();
        let mut last = Status::new(StatusCode::Conflict, SAME_MATCH_EXISTS);
        for variant in safe {
            last = self.add_entry_internal(variant, mode).await;
        }

        self.inner.telemetry.emit(TelemetryEvent::ModifyDecoupled {
            node: current.node().clone(),
            removed: old_variants.len(),
            added,
        });
        last
    }

    /// Modifies variants pairwise, restoring earlier pairs if one fails.
    async fn modify_in_place(
        &self,
        current: &FlowEntry,
        old_variants: &[InstallEntry],
        new_variants: &[InstallEntry],
        mode: DispatchMode,
    ) -> Status {
        let node = current.node().clone();
        let mut last = Status::success();

        for (i, (old, new)) in old_variants.iter().zip(new_variants).enumerate() {
            let status = self.modify_entry_internal(old, new.clone(), mode).await;
            if status.is_success() {
                last = status;
                continue;
            }

            for (restored_new, restored_old) in new_variants[..i].iter().zip(&old_variants[..i]) {
                let rollback = self
                    .modify_entry_internal(restored_new, restored_old.clone(), mode)
                    .await;
                if !rollback.is_success() {
                    error!(node = %node, variant = %restored_old, "Flow recovery failed");
                    self.inner
                        .telemetry
                        .emit(TelemetryEvent::ModifyUnrecoverable { node });
                    return Status::new(StatusCode::InternalError, "Flow recovery failed ! Unrecoverable Error");
                }
            }
            if i > 0 {
                self.inner
                    .telemetry
                    .emit(TelemetryEvent::ModifyRolledBack { node, restored: i });
            }
            return status;
        }

        self.inner.telemetry.emit(TelemetryEvent::ModifiedInPlace {
            node,
            variants: new_variants.len(),
        });
        last
    }
}

fn stopping() -> Status {
    Status::new(StatusCode::NotAcceptable, "Forwarding rules manager is stopping")
}
