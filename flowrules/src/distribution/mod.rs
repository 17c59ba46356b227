//! Work distribution between controllers.
//!
//! Only the controller a device is attached to may program it. When a
//! request targets a device owned elsewhere, the requester publishes a
//! [`DistributionOrder`] into the shared work-order table and waits on a
//! [`StatusHandle`]. The owner picks the order up through its table listener,
//! executes it locally, deletes the order and publishes a status into the
//! work-status table, which completes the requester's handle.
//!
//! ```text
//!   requester                      frm.workOrder / frm.workStatus            owner
//!   ─────────                      ──────────────────────────────            ─────
//!   register handle
//!   put(order, entry) ───────────────────────────────────────────► WorkOrder event
//!                                                                   execute locally
//!                                                                   remove(order)
//!   complete handle  ◄──────────────────────────────────────────── put(order, status)
//!   WorkStatusCleanup
//!   remove(order)
//! ```

mod handle;
mod order;
mod views;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::cluster::{
    CacheListener, CacheMode, ClusterError, ClusterMember, ControllerId, LocalityOracle, ReplicatedTable,
};
use crate::event_loop::FrmEvent;
use crate::logging::SYNC_TARGET;
use crate::model::{InstallEntry, NodeId, Status, UpdateType};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

pub use handle::{RequestState, StatusHandle, WorkMonitor};
pub use order::DistributionOrder;
pub use views::{SharedFlowViews, INSTALLED_VIEW_TABLE, ORIGINAL_VIEW_TABLE};

/// Replicated table carrying pending work orders.
pub const WORK_ORDER_TABLE: &str = "frm.workOrder";

/// Replicated table carrying work-order results.
pub const WORK_STATUS_TABLE: &str = "frm.workStatus";

/// Decides where an operation executes and runs the requester side of the
/// distribution protocol.
pub struct WorkDistributor {
    me: ControllerId,
    locality: Arc<dyn LocalityOracle>,
    work_orders: ReplicatedTable<DistributionOrder, InstallEntry>,
    work_status: ReplicatedTable<DistributionOrder, Status>,
    monitor: WorkMonitor,
    telemetry: Arc<dyn TelemetrySink>,
}

impl WorkDistributor {
    /// Opens the work tables on `member`.
    pub fn new(
        member: &ClusterMember,
        locality: Arc<dyn LocalityOracle>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ClusterError> {
        Ok(Self {
            me: member.my_address().clone(),
            locality,
            work_orders: member.table(WORK_ORDER_TABLE, CacheMode::NonTransactional)?,
            work_status: member.table(WORK_STATUS_TABLE, CacheMode::NonTransactional)?,
            monitor: WorkMonitor::new(),
            telemetry,
        })
    }

    /// Starts forwarding table updates relevant to this controller as events.
    pub(crate) fn subscribe(&self, events: mpsc::UnboundedSender<FrmEvent>) {
        self.work_orders.subscribe(Arc::new(WorkOrderListener {
            locality: Arc::clone(&self.locality),
            events: events.clone(),
        }));
        self.work_status.subscribe(Arc::new(WorkStatusListener {
            me: self.me.clone(),
            monitor: self.monitor.clone(),
            events,
        }));
    }

    pub fn my_address(&self) -> &ControllerId {
        &self.me
    }

    pub fn is_local(&self, node: &NodeId) -> bool {
        self.locality.is_local(node)
    }

    pub fn monitor(&self) -> &WorkMonitor {
        &self.monitor
    }

    /// Publishes a work order when `entry`'s device is owned by another
    /// controller and returns the handle to wait on. Returns `None` when the
    /// operation must run locally.
    ///
    /// For [`UpdateType::Changed`] the published value is `new_entry`;
    /// otherwise it is `entry` itself.
    pub fn distribute(
        &self,
        entry: &InstallEntry,
        new_entry: Option<&InstallEntry>,
        op: UpdateType,
    ) -> Option<StatusHandle> {
        if self.is_local(entry.node()) {
            return None;
        }

        let order = DistributionOrder::new(entry.clone(), op, self.me.clone());
        let handle = self.monitor.register(order.clone());
        let value = match (op, new_entry) {
            (UpdateType::Changed, Some(updated)) => updated.clone(),
            _ => entry.clone(),
        };

        trace!(target: SYNC_TARGET, order = %order, "Distributing work order");
        self.telemetry.emit(TelemetryEvent::OrderIssued {
            node: entry.node().clone(),
            op,
        });
        self.work_orders.put(order, value);
        Some(handle)
    }

    /// Owner side: retires an executed order and publishes its status.
    pub(crate) fn publish_status(&self, order: &DistributionOrder, status: Status) {
        self.work_orders.remove(order);
        trace!(target: SYNC_TARGET, order = %order, status = %status, "Publishing work order status");
        self.work_status.put(order.clone(), status);
    }

    /// Requester side: drops a consumed status from the shared table.
    pub(crate) fn clean_up_status(&self, order: &DistributionOrder) {
        if self.work_status.remove(order).is_some() {
            trace!(target: SYNC_TARGET, order = %order, "Removed consumed work status");
        }
    }

    /// Force-completes every pending handle. Used at shutdown.
    pub(crate) fn cancel_pending(&self) -> usize {
        let count = self.monitor.cancel_all();
        if count > 0 {
            self.telemetry.emit(TelemetryEvent::OrdersCancelled { count });
        }
        count
    }
}

// =============================================================================
// Table listeners
// =============================================================================

/// Queues orders targeting devices attached to this controller.
struct WorkOrderListener {
    locality: Arc<dyn LocalityOracle>,
    events: mpsc::UnboundedSender<FrmEvent>,
}

impl CacheListener<DistributionOrder, InstallEntry> for WorkOrderListener {
    fn entry_updated(&self, order: &DistributionOrder, value: &InstallEntry, _table: &str, origin_local: bool) {
        if origin_local {
            return;
        }
        if !self.locality.is_local(order.entry().node()) {
            return;
        }
        trace!(target: SYNC_TARGET, order = %order, "Received work order");
        let event = FrmEvent::WorkOrder {
            order: order.clone(),
            new_entry: value.clone(),
        };
        if self.events.send(event).is_err() {
            trace!(target: SYNC_TARGET, order = %order, "Event loop stopped, dropping work order");
        }
    }
}

/// Completes our pending handles from statuses published by owners.
struct WorkStatusListener {
    me: ControllerId,
    monitor: WorkMonitor,
    events: mpsc::UnboundedSender<FrmEvent>,
}

impl CacheListener<DistributionOrder, Status> for WorkStatusListener {
    fn entry_updated(&self, order: &DistributionOrder, status: &Status, _table: &str, origin_local: bool) {
        if origin_local || order.requestor() != &self.me {
            return;
        }
        if !self.monitor.complete(order, status.clone()) {
            // Timed out or already resolved; the cleanup below still applies.
            trace!(target: SYNC_TARGET, order = %order, "Status for order no longer awaited");
        }
        let _ = self.events.send(FrmEvent::WorkStatusCleanup(order.clone()));
    }
}
