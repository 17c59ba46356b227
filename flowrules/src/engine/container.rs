//! Container-wide sweeps: container-flow changes, container mode and stop.

use tracing::{debug, info, warn};

use super::{unique_originals, ForwardingRulesManager};
use crate::model::{FlowEntry, InstallEntry, UpdateType};
use crate::programmer::DispatchMode;
use crate::static_flows::{status_success, STATUS_CONTAINER_MODE};
use crate::telemetry::TelemetryEvent;

impl ForwardingRulesManager {
    /// Worker: re-derives every installed non-internal entry after the
    /// container flows changed.
    ///
    /// Merging is not injective, so nothing is diffed: every variant is
    /// removed and the requested entries are installed again under the
    /// current container flows.
    pub(crate) async fn reconcile_container_flows(&self) {
        let installed = self.installed_non_internal();
        if installed.is_empty() {
            debug!(container = self.inner.container.name(), "No entries to reconcile");
            return;
        }
        let originals = unique_originals(&installed);
        info!(
            container = self.inner.container.name(),
            variants = installed.len(),
            entries = originals.len(),
            "Container flows changed, reinstalling entries"
        );

        for entry in &installed {
            let status = self.remove_entry_internal(entry, DispatchMode::Async).await;
            if !status.is_success() {
                warn!(variant = %entry, status = %status, "Failed to remove entry during reconcile");
            }
        }

        let mut reinstalled = 0usize;
        let mut failed = 0usize;
        for original in &originals {
            if self.install_flow_entry(original, DispatchMode::Async).await.is_success() {
                reinstalled += 1;
            } else {
                failed += 1;
            }
        }
        self.inner
            .telemetry
            .emit(TelemetryEvent::ContainerFlowsReconciled { reinstalled, failed });
    }

    /// A non-default container was created (`Added`) or the last one was
    /// removed (`Removed`). Only meaningful on the default container.
    pub async fn container_mode_updated(&self, update: UpdateType) {
        if !self.inner.container.is_default() {
            return;
        }
        match update {
            UpdateType::Added => self.enter_container_mode().await,
            UpdateType::Removed => self.leave_container_mode().await,
            UpdateType::Changed => {}
        }
    }

    async fn enter_container_mode(&self) {
        if self.inner.container.in_container_mode() {
            return;
        }
        self.inner.container.set_container_mode(true);
        let parked = self.park_installed_entries().await;
        info!(parked, "Entered container mode");

        for config in self.inner.static_flows.lock().iter_mut() {
            if !config.is_internal() {
                config.set_status(STATUS_CONTAINER_MODE);
            }
        }
    }

    async fn leave_container_mode(&self) {
        if !self.inner.container.in_container_mode() {
            return;
        }
        self.inner.container.set_container_mode(false);

        let parked: Vec<FlowEntry> = std::mem::take(&mut *self.inner.inactive.lock());
        info!(entries = parked.len(), "Left container mode, reinstalling entries");
        for entry in &parked {
            let status = self.add_entry(entry, DispatchMode::Async).await;
            if !status.is_success() {
                warn!(entry = %entry, status = %status, "Failed to reinstall entry after container mode");
            }
        }

        for config in self.inner.static_flows.lock().iter_mut() {
            if !config.is_internal() && config.install_in_hw() {
                config.set_status(status_success());
            }
        }
    }

    /// Uninstalls all non-internal entries before the manager is shut down.
    /// They are kept in the inactive list.
    pub async fn stop(&self) {
        let parked = self.park_installed_entries().await;
        self.mark_stopping();
        info!(parked, "Forwarding rules manager stopped");
    }

    /// Moves installed non-internal entries to the inactive list and removes
    /// them from their devices. Returns the number of requested entries parked.
    async fn park_installed_entries(&self) -> usize {
        let installed = self.installed_non_internal();
        let originals = unique_originals(&installed);
        {
            let mut inactive = self.inner.inactive.lock();
            for original in &originals {
                if !inactive.iter().any(|parked| parked.key() == original.key()) {
                    inactive.push(original.clone());
                }
            }
        }
        for original in &originals {
            let status = self.remove_entry(original, DispatchMode::Async).await;
            if !status.is_success() {
                warn!(entry = %original, status = %status, "Failed to remove entry while parking");
            }
        }
        originals.len()
    }

    fn installed_non_internal(&self) -> Vec<InstallEntry> {
        self.inner
            .database
            .read()
            .installed_entries()
            .filter(|entry| !entry.original().is_internal())
            .cloned()
            .collect()
    }
}
