//! Per-variant programming: decide locality, program the device, record the
//! result.
//!
//! Each function either hands the operation to the owning controller and
//! waits for its status, or programs the local device and, on success,
//! commits the change to the flow database through the event loop.

use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{trace, warn};

use super::reconcile::SAME_MATCH_EXISTS;
use super::ForwardingRulesManager;
use crate::distribution::{DistributionOrder, RequestState, StatusHandle};
use crate::error::FrmError;
use crate::event_loop::FrmEvent;
use crate::logging::SYNC_TARGET;
use crate::model::{InstallEntry, Status, StatusCode, UpdateType};
use crate::programmer::DispatchMode;
use crate::telemetry::TelemetryEvent;

impl ForwardingRulesManager {
    pub(crate) async fn add_entry_internal(&self, entry: InstallEntry, mode: DispatchMode) -> Status {
        if let Some(handle) = self.inner.distributor.distribute(&entry, None, UpdateType::Added) {
            return self.await_remote(handle).await;
        }

        let status = self
            .inner
            .programmer
            .add_flow(entry.node(), entry.install().flow(), mode)
            .await;
        if !status.is_success() {
            warn!(entry = %entry, status = %status, "Device rejected flow add");
            return status;
        }
        trace!(entry = %entry, request_id = status.request_id(), "Added flow entry");

        let mut entry = entry;
        entry.set_request_id(status.request_id());
        self.commit(entry, true).await;
        status
    }

    pub(crate) async fn modify_entry_internal(
        &self,
        current: &InstallEntry,
        new: InstallEntry,
        mode: DispatchMode,
    ) -> Status {
        if let Some(handle) = self
            .inner
            .distributor
            .distribute(current, Some(&new), UpdateType::Changed)
        {
            return self.await_remote(handle).await;
        }

        let status = self
            .inner
            .programmer
            .modify_flow(current.node(), current.install().flow(), new.install().flow(), mode)
            .await;
        if !status.is_success() {
            warn!(current = %current, new = %new, status = %status, "Device rejected flow modify");
            return status;
        }
        trace!(current = %current, new = %new, "Modified flow entry");

        let mut new = new;
        new.set_request_id(status.request_id());
        self.commit(current.clone(), false).await;
        self.commit(new, true).await;
        status
    }

    pub(crate) async fn remove_entry_internal(&self, entry: &InstallEntry, mode: DispatchMode) -> Status {
        if let Some(handle) = self.inner.distributor.distribute(entry, None, UpdateType::Removed) {
            return self.await_remote(handle).await;
        }

        let status = self
            .inner
            .programmer
            .remove_flow(entry.node(), entry.install().flow(), mode)
            .await;
        if !status.is_success() {
            warn!(entry = %entry, status = %status, "Device rejected flow removal");
            return status;
        }
        trace!(entry = %entry, "Removed flow entry");

        self.commit(entry.clone(), false).await;
        status
    }

    /// Owner side of the distribution protocol: runs an order received from
    /// another controller and publishes the outcome.
    pub(crate) async fn execute_work_order(&self, order: DistributionOrder, new_entry: InstallEntry) {
        let status = match self.check_order_collision(&order, &new_entry) {
            Some(status) => status,
            None => self.run_work_order(&order, new_entry).await,
        };

        self.inner.telemetry.emit(TelemetryEvent::WorkOrderExecuted {
            node: order.entry().node().clone(),
            op: order.op(),
            requestor: order.requestor().clone(),
            code: status.code(),
        });
        self.inner.distributor.publish_status(&order, status);
    }

    /// The requester checked against the cluster views, which may lag behind
    /// this controller's database. Re-checks adds and modifies against it.
    fn check_order_collision(&self, order: &DistributionOrder, new_entry: &InstallEntry) -> Option<Status> {
        let db = self.inner.database.read();
        match order.op() {
            UpdateType::Added => {
                let existing = db.lookup_installed(&order.entry().key())?.original();
                let requested = order.entry().original();
                if existing.flow() == requested.flow() && existing.name() == requested.name() {
                    return Some(Status::new(StatusCode::Success, "Entry is already installed"));
                }
                warn!(target: SYNC_TARGET, order = %order, "{}", SAME_MATCH_EXISTS);
                Some(Status::new(StatusCode::Conflict, SAME_MATCH_EXISTS))
            }
            UpdateType::Changed => {
                let existing = db.lookup_installed(&new_entry.key())?;
                if existing.original().key() == order.entry().original().key() {
                    return None;
                }
                warn!(target: SYNC_TARGET, order = %order, "{}", SAME_MATCH_EXISTS);
                Some(Status::new(StatusCode::Conflict, SAME_MATCH_EXISTS))
            }
            UpdateType::Removed => None,
        }
    }

    async fn run_work_order(&self, order: &DistributionOrder, new_entry: InstallEntry) -> Status {
        match order.op() {
            UpdateType::Added => {
                self.add_entry_internal(order.entry().clone(), DispatchMode::Async)
                    .await
            }
            UpdateType::Changed => {
                self.modify_entry_internal(order.entry(), new_entry, DispatchMode::Async)
                    .await
            }
            UpdateType::Removed => {
                self.remove_entry_internal(order.entry(), DispatchMode::Async)
                    .await
            }
        }
    }

    async fn await_remote(&self, mut handle: StatusHandle) -> Status {
        let started = Instant::now();
        let status = handle.wait(Some(self.inner.config.distribution_timeout)).await;

        let node = handle.order().entry().node().clone();
        let op = handle.order().op();
        match handle.state() {
            RequestState::TimedOut => {
                warn!(target: SYNC_TARGET, order = %handle.order(), "No status from owning controller");
                self.inner
                    .telemetry
                    .emit(TelemetryEvent::OrderTimedOut { node, op });
            }
            _ => self.inner.telemetry.emit(TelemetryEvent::OrderCompleted {
                node,
                op,
                code: status.code(),
                waited: started.elapsed(),
            }),
        }
        status
    }

    /// Applies a database mutation through the event loop and waits until
    /// it is visible to readers.
    pub(crate) async fn update_local_database(&self, entry: InstallEntry, add: bool) -> Result<(), FrmError> {
        let (ack, applied) = oneshot::channel();
        self.enqueue(FrmEvent::DatabaseUpdate {
            entry,
            add,
            ack: Some(ack),
        })?;
        applied.await.map_err(|_| FrmError::EventLoopStopped)
    }

    async fn commit(&self, entry: InstallEntry, add: bool) {
        if let Err(e) = self.update_local_database(entry, add).await {
            warn!(error = %e, add, "Flow database not updated after programming");
        }
    }
}
