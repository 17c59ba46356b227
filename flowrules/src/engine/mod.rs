//! The forwarding rules manager.
//!
//! [`ForwardingRulesManager`] is the public face of the crate: callers hand
//! it flow entries to install, modify or remove, and it reconciles them with
//! the container flows, the flow database and the devices.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ ForwardingRulesManager (cloneable handle)                          │
//! │   install / modify / uninstall / group / static flows / queries    │
//! ├───────────────────────────┬───────────────────────────────────────┤
//! │ ContainerView             │ WorkDistributor                        │
//! │ derive install variants   │ local? program here : publish order    │
//! ├───────────────────────────┴───────────────────────────────────────┤
//! │ FlowProgrammer (devices)          FlowEventLoop (single DB writer) │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads of the [`FlowDatabase`] happen under a shared lock from any task.
//! Every write is an event processed by the [`FlowEventLoop`]; callers that
//! programmed a device wait for the loop's acknowledgement before returning,
//! so an operation's own effects are visible as soon as it completes.
//!
//! The database only covers devices attached to this controller. Lookups for
//! other devices go to the [`SharedFlowViews`], which every owner keeps in
//! step with its own database.

mod container;
mod devices;
mod internal;
mod ports;
mod reconcile;
mod statics;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::info;

use crate::cluster::{ClusterMember, LocalityOracle};
use crate::config::ManagerConfig;
use crate::container::ContainerView;
use crate::database::FlowDatabase;
use crate::distribution::{SharedFlowViews, WorkDistributor};
use crate::error::FrmError;
use crate::event_loop::{FlowEventLoop, FrmEvent};
use crate::model::{ContainerFlow, Flow, FlowEntry, InstallEntry, InstallKey, NodeId, PortId, Status, UpdateType};
use crate::programmer::{DispatchMode, FlowProgrammer};
use crate::static_flows::StaticFlowRegistry;
use crate::telemetry::TelemetrySink;

/// Receives notifications about flow entries changing outside a caller's request.
pub trait FrmListener: Send + Sync {
    /// A device rejected the asynchronous request `request_id`.
    fn request_failed(&self, request_id: u64, error: &str);

    /// A device dropped an installed entry on its own (idle/hard timeout, eviction).
    fn flow_removed(&self, _entry: &FlowEntry, _status: &Status) {}
}

/// External services the manager depends on.
pub struct Collaborators {
    pub programmer: Arc<dyn FlowProgrammer>,
    pub cluster: ClusterMember,
    pub locality: Arc<dyn LocalityOracle>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

pub(crate) struct ManagerInner {
    pub(crate) config: ManagerConfig,
    pub(crate) container: Arc<ContainerView>,
    pub(crate) database: RwLock<FlowDatabase>,
    pub(crate) shared: SharedFlowViews,
    pub(crate) inactive: Mutex<Vec<FlowEntry>>,
    pub(crate) static_flows: Mutex<StaticFlowRegistry>,
    pub(crate) programmer: Arc<dyn FlowProgrammer>,
    pub(crate) distributor: WorkDistributor,
    pub(crate) events: mpsc::UnboundedSender<FrmEvent>,
    pub(crate) listeners: RwLock<Vec<Arc<dyn FrmListener>>>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) stopping: AtomicBool,
}

/// Handle to a forwarding rules manager. Clones share the same state.
#[derive(Clone)]
pub struct ForwardingRulesManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl ForwardingRulesManager {
    /// Creates the manager and the event loop that must be spawned to drive it.
    ///
    /// ```ignore
    /// let (frm, event_loop) = ForwardingRulesManager::new(config, container, collaborators)?;
    /// let shutdown = CancellationToken::new();
    /// tokio::spawn(event_loop.run(shutdown.clone()));
    /// ```
    pub fn new(
        config: ManagerConfig,
        container: Arc<ContainerView>,
        collaborators: Collaborators,
    ) -> Result<(Self, FlowEventLoop), FrmError> {
        if config.container_name != container.name() {
            return Err(FrmError::ContainerMismatch {
                configured: config.container_name.clone(),
                view: container.name().to_string(),
            });
        }

        let Collaborators {
            programmer,
            cluster,
            locality,
            telemetry,
        } = collaborators;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let distributor = WorkDistributor::new(&cluster, locality, Arc::clone(&telemetry))?;
        distributor.subscribe(events_tx.clone());
        let shared = SharedFlowViews::open(&cluster)?;

        info!(
            container = container.name(),
            controller = %cluster.my_address(),
            workers = config.worker_pool_size,
            "Forwarding rules manager created"
        );

        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                container,
                database: RwLock::new(FlowDatabase::new()),
                shared,
                inactive: Mutex::new(Vec::new()),
                static_flows: Mutex::new(StaticFlowRegistry::new()),
                programmer,
                distributor,
                events: events_tx,
                listeners: RwLock::new(Vec::new()),
                telemetry,
                stopping: AtomicBool::new(false),
            }),
        };
        let event_loop = FlowEventLoop::new(manager.clone(), events_rx);
        Ok((manager, event_loop))
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn container(&self) -> &Arc<ContainerView> {
        &self.inner.container
    }

    pub fn add_listener(&self, listener: Arc<dyn FrmListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopping(&self) {
        self.inner.stopping.store(true, Ordering::Release);
    }

    pub(crate) fn is_local(&self, node: &NodeId) -> bool {
        self.inner.distributor.is_local(node)
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn FrmListener>> {
        self.inner.listeners.read().clone()
    }

    pub(crate) fn enqueue(&self, event: FrmEvent) -> Result<(), FrmError> {
        self.inner.events.send(event).map_err(|_| FrmError::EventLoopStopped)
    }

    // =========================================================================
    // Notifications from collaborators
    // =========================================================================

    /// A device connected to this controller.
    pub fn on_node_up(&self, node: NodeId) {
        self.notify(FrmEvent::NodeUp(node));
    }

    /// A device disconnected from this controller.
    pub fn on_node_down(&self, node: NodeId) {
        self.notify(FrmEvent::NodeDown(node));
    }

    /// A device port appeared or disappeared.
    pub fn on_port_update(&self, port: PortId, update: UpdateType) {
        if update == UpdateType::Changed {
            return;
        }
        self.notify(FrmEvent::PortUpdate { port, update });
    }

    /// A device reported a failure for an asynchronous request.
    pub fn on_device_error(&self, node: NodeId, request_id: u64, error: Option<String>) {
        self.notify(FrmEvent::ErrorReported {
            node,
            request_id,
            error,
        });
    }

    /// A device removed a flow on its own.
    pub fn on_flow_removed(&self, node: NodeId, flow: Flow) {
        self.notify(FrmEvent::FlowRemoved { node, flow });
    }

    /// The container's flow set changed. Installed entries are re-derived
    /// in the background.
    pub fn container_flow_updated(&self, previous: Option<&ContainerFlow>, current: &ContainerFlow, update: UpdateType) {
        self.inner
            .container
            .apply_container_flow_update(previous, current, update);
        self.notify(FrmEvent::ContainerFlowChanged);
    }

    fn notify(&self, event: FrmEvent) {
        if let Err(e) = self.enqueue(event) {
            tracing::debug!(error = %e, "Dropping notification");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Requested entries belonging to `group`, on any device of the cluster.
    pub fn flow_entries_for_group(&self, group: &str) -> Vec<FlowEntry> {
        let remote = self.remote_group_entries(group);
        let db = self.inner.database.read();
        unique_originals(db.group_entries(group).iter().chain(&remote))
    }

    /// Entries of `group` as actually programmed on devices.
    pub fn installed_flow_entries_for_group(&self, group: &str) -> Vec<FlowEntry> {
        let remote = self.remote_group_entries(group);
        let db = self.inner.database.read();
        db.group_entries(group)
            .iter()
            .chain(&remote)
            .map(|e| e.install().clone())
            .collect()
    }

    pub fn installed_entries_for_node(&self, node: &NodeId) -> Vec<InstallEntry> {
        if self.is_local(node) {
            self.inner.database.read().node_entries(node).to_vec()
        } else {
            self.inner.shared.node_installed(node)
        }
    }

    /// The stored requested entry with the same (node, match, priority) as `entry`.
    pub fn original_entry(&self, entry: &FlowEntry) -> Option<FlowEntry> {
        if self.is_local(entry.node()) {
            self.inner.database.read().lookup_original(entry).cloned()
        } else {
            self.inner.shared.original(entry)
        }
    }

    pub fn installed_entry(&self, key: &InstallKey) -> Option<InstallEntry> {
        if self.is_local(&key.flow.node) {
            self.inner.database.read().lookup_installed(key).cloned()
        } else {
            self.inner.shared.installed(key)
        }
    }

    fn remote_group_entries(&self, group: &str) -> Vec<InstallEntry> {
        self.inner
            .shared
            .group_installed(group, |node| !self.is_local(node))
    }

    /// True if `entry` conflicts with every container flow.
    pub fn check_flow_entry_conflict(&self, entry: &FlowEntry) -> bool {
        self.inner.container.derive_install_entries(entry).is_empty()
    }

    /// Entries parked while the controller is in container mode.
    pub fn inactive_flow_entries(&self) -> Vec<FlowEntry> {
        self.inner.inactive.lock().clone()
    }

    /// Work orders still awaiting a status from another controller.
    pub fn pending_distributions(&self) -> usize {
        self.inner.distributor.monitor().len()
    }

    /// Runs `f` against a consistent snapshot of the flow database.
    pub fn with_database<R>(&self, f: impl FnOnce(&FlowDatabase) -> R) -> R {
        f(&self.inner.database.read())
    }

    /// Asks `node` to confirm all outstanding requests.
    pub async fn solicit_status_response(&self, node: &NodeId, mode: DispatchMode) -> Status {
        self.inner.programmer.send_barrier(node, mode).await
    }
}

/// Requested entries behind `entries`, one per (node, match, priority).
pub(crate) fn unique_originals<'a>(entries: impl IntoIterator<Item = &'a InstallEntry>) -> Vec<FlowEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(InstallEntry::original)
        .filter(|original| seen.insert(original.key()))
        .cloned()
        .collect()
}
