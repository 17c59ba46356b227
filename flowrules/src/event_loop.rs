//! The flow event loop.
//!
//! [`FlowEventLoop`] is the only writer of the flow database. Everything that
//! mutates it arrives as an [`FrmEvent`] on one unbounded channel and is
//! applied in queue order. Events whose handling may block on a device or on
//! another controller are handed to a bounded pool of worker tasks instead,
//! so the loop itself never waits on I/O.
//!
//! ```text
//!  notifications ─┐                         ┌─► inline: DatabaseUpdate, NodeDown,
//!  table listeners├─► mpsc ─► FlowEventLoop ┤           ErrorReported, FlowRemoved,
//!  commits        ─┘                         │           WorkStatusCleanup
//!                                            └─► workers (Semaphore): NodeUp, PortUpdate,
//!                                                        WorkOrder, ContainerFlowChanged
//! ```
//!
//! # Shutdown
//!
//! When the shutdown token fires the manager refuses new work, the queue is
//! closed and drained, every outstanding distributed request is cancelled
//! and workers that have not started yet are released.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::distribution::DistributionOrder;
use crate::engine::ForwardingRulesManager;
use crate::model::{Flow, InstallEntry, NodeId, PortId, UpdateType};

/// Upper bound on waiting for running workers at shutdown.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Work items processed by the [`FlowEventLoop`].
#[derive(Debug)]
pub enum FrmEvent {
    /// A device connected; replay its static flows.
    NodeUp(NodeId),
    /// A device disconnected; purge its entries.
    NodeDown(NodeId),
    PortUpdate {
        port: PortId,
        update: UpdateType,
    },
    /// A device rejected an asynchronous request.
    ErrorReported {
        node: NodeId,
        request_id: u64,
        error: Option<String>,
    },
    /// A device dropped a flow on its own.
    FlowRemoved {
        node: NodeId,
        flow: Flow,
    },
    /// Another controller asked us to program a device we own.
    WorkOrder {
        order: DistributionOrder,
        new_entry: InstallEntry,
    },
    /// A status we requested arrived and can be dropped from the shared table.
    WorkStatusCleanup(DistributionOrder),
    /// The container flow set changed; re-derive installed entries.
    ContainerFlowChanged,
    /// Record (`add`) or forget one install variant. `ack` fires once the
    /// change is visible to readers.
    DatabaseUpdate {
        entry: InstallEntry,
        add: bool,
        ack: Option<oneshot::Sender<()>>,
    },
}

impl FrmEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FrmEvent::NodeUp(_) => "node_up",
            FrmEvent::NodeDown(_) => "node_down",
            FrmEvent::PortUpdate { .. } => "port_update",
            FrmEvent::ErrorReported { .. } => "error_reported",
            FrmEvent::FlowRemoved { .. } => "flow_removed",
            FrmEvent::WorkOrder { .. } => "work_order",
            FrmEvent::WorkStatusCleanup(_) => "work_status_cleanup",
            FrmEvent::ContainerFlowChanged => "container_flow_changed",
            FrmEvent::DatabaseUpdate { .. } => "database_update",
        }
    }
}

/// Drives a [`ForwardingRulesManager`]. Created by
/// [`ForwardingRulesManager::new`]; spawn [`FlowEventLoop::run`] once.
pub struct FlowEventLoop {
    manager: ForwardingRulesManager,
    rx: mpsc::UnboundedReceiver<FrmEvent>,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl FlowEventLoop {
    pub(crate) fn new(manager: ForwardingRulesManager, rx: mpsc::UnboundedReceiver<FrmEvent>) -> Self {
        let pool_size = manager.config().worker_pool_size;
        Self {
            manager,
            rx,
            workers: Arc::new(Semaphore::new(pool_size)),
            tracker: TaskTracker::new(),
        }
    }

    /// Processes events until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            workers = self.manager.config().worker_pool_size,
            "Flow event loop starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Flow event loop shutting down");
                    break;
                }

                event = self.rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    fn dispatch(&self, event: FrmEvent) {
        trace!(event = event.kind(), "Processing event");
        match event {
            FrmEvent::DatabaseUpdate { entry, add, ack } => {
                self.manager.apply_database_update(entry, add);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            FrmEvent::NodeDown(node) => self.manager.purge_node(&node),
            FrmEvent::ErrorReported {
                node,
                request_id,
                error,
            } => self.manager.apply_error_report(&node, request_id, error),
            FrmEvent::FlowRemoved { node, flow } => self.manager.apply_flow_removed(&node, &flow),
            FrmEvent::WorkStatusCleanup(order) => self.manager.inner.distributor.clean_up_status(&order),

            FrmEvent::NodeUp(node) => {
                let manager = self.manager.clone();
                self.spawn_worker(async move { manager.replay_static_flows(&node).await });
            }
            FrmEvent::PortUpdate { port, update } => {
                let manager = self.manager.clone();
                self.spawn_worker(async move { manager.handle_port_update(&port, update).await });
            }
            FrmEvent::WorkOrder { order, new_entry } => {
                let manager = self.manager.clone();
                self.spawn_worker(async move { manager.execute_work_order(order, new_entry).await });
            }
            FrmEvent::ContainerFlowChanged => {
                let manager = self.manager.clone();
                self.spawn_worker(async move { manager.reconcile_container_flows().await });
            }
        }
    }

    /// Runs `job` once a worker permit is available. The loop does not wait
    /// for the permit.
    fn spawn_worker<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        self.tracker.spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                trace!("Worker pool closed, dropping job");
                return;
            };
            job.await;
        });
    }

    async fn shutdown(mut self) {
        self.manager.mark_stopping();
        self.rx.close();

        let mut drained = 0usize;
        while let Some(event) = self.rx.recv().await {
            drained += 1;
            // Acknowledge pending commits so their callers return.
            if let FrmEvent::DatabaseUpdate { entry, add, ack } = event {
                self.manager.apply_database_update(entry, add);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }

        let cancelled = self.manager.inner.distributor.cancel_pending();
        self.workers.close();
        self.tracker.close();
        if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(running = self.tracker.len(), "Workers still running after shutdown");
        }
        info!(drained, cancelled, "Flow event loop stopped");
    }
}

impl std::fmt::Debug for FlowEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEventLoop")
            .field("available_workers", &self.workers.available_permits())
            .field("running", &self.tracker.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
