//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowrules::cluster::{ClusterHub, ControllerId, Locality, LocalityOracle};
use flowrules::model::{Action, Flow, FlowEntry, Match, MatchField, NodeId, Status, StatusCode};
use flowrules::telemetry::{TelemetryEvent, TelemetrySink};
use flowrules::{
    Collaborators, ContainerView, DispatchMode, FlowProgrammer, ForwardingRulesManager, FrmListener, ManagerConfig,
    ProgrammingFuture,
};

// ============================================================================
// Flow programmer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Add,
    Modify,
    Remove,
    Barrier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgrammerCall {
    Add { node: NodeId, flow: Flow },
    Modify { node: NodeId, old: Flow, new: Flow },
    Remove { node: NodeId, flow: Flow },
    Barrier { node: NodeId },
}

impl ProgrammerCall {
    pub fn kind(&self) -> CallKind {
        match self {
            ProgrammerCall::Add { .. } => CallKind::Add,
            ProgrammerCall::Modify { .. } => CallKind::Modify,
            ProgrammerCall::Remove { .. } => CallKind::Remove,
            ProgrammerCall::Barrier { .. } => CallKind::Barrier,
        }
    }
}

/// Records every device request and answers with success unless scripted
/// otherwise. Successful answers carry increasing request ids.
#[derive(Default)]
pub struct MockFlowProgrammer {
    calls: Mutex<Vec<ProgrammerCall>>,
    counts: Mutex<HashMap<CallKind, usize>>,
    script: Mutex<HashMap<(CallKind, usize), Status>>,
    next_request_id: AtomicU64,
}

impl MockFlowProgrammer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answers the `nth` (0-based) call of `kind` with `status`.
    pub fn fail_call(&self, kind: CallKind, nth: usize, status: Status) {
        self.script.lock().insert((kind, nth), status);
    }

    pub fn calls(&self) -> Vec<ProgrammerCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }

    fn answer(&self, call: ProgrammerCall) -> Status {
        let kind = call.kind();
        self.calls.lock().push(call);
        let nth = {
            let mut counts = self.counts.lock();
            let slot = counts.entry(kind).or_insert(0);
            let nth = *slot;
            *slot += 1;
            nth
        };
        if let Some(status) = self.script.lock().remove(&(kind, nth)) {
            return status;
        }
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        Status::success().with_request_id(request_id)
    }
}

impl FlowProgrammer for MockFlowProgrammer {
    fn add_flow<'a>(&'a self, node: &'a NodeId, flow: &'a Flow, _mode: DispatchMode) -> ProgrammingFuture<'a> {
        let status = self.answer(ProgrammerCall::Add {
            node: node.clone(),
            flow: flow.clone(),
        });
        Box::pin(async move { status })
    }

    fn modify_flow<'a>(
        &'a self,
        node: &'a NodeId,
        old: &'a Flow,
        new: &'a Flow,
        _mode: DispatchMode,
    ) -> ProgrammingFuture<'a> {
        let status = self.answer(ProgrammerCall::Modify {
            node: node.clone(),
            old: old.clone(),
            new: new.clone(),
        });
        Box::pin(async move { status })
    }

    fn remove_flow<'a>(&'a self, node: &'a NodeId, flow: &'a Flow, _mode: DispatchMode) -> ProgrammingFuture<'a> {
        let status = self.answer(ProgrammerCall::Remove {
            node: node.clone(),
            flow: flow.clone(),
        });
        Box::pin(async move { status })
    }

    fn send_barrier<'a>(&'a self, node: &'a NodeId, _mode: DispatchMode) -> ProgrammingFuture<'a> {
        let status = self.answer(ProgrammerCall::Barrier { node: node.clone() });
        Box::pin(async move { status })
    }
}

// ============================================================================
// Locality, telemetry and listeners
// ============================================================================

/// Owns exactly the listed devices.
pub struct StaticLocality {
    local: HashSet<NodeId>,
}

impl StaticLocality {
    pub fn new(nodes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            local: nodes.iter().map(|n| NodeId::new(*n)).collect(),
        })
    }
}

impl LocalityOracle for StaticLocality {
    fn locality(&self, node: &NodeId) -> Locality {
        if self.local.contains(node) {
            Locality::Local
        } else {
            Locality::NotLocal
        }
    }
}

#[derive(Default)]
pub struct RecordingTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetrySink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn contains(&self, predicate: impl Fn(&TelemetryEvent) -> bool) -> bool {
        self.events.lock().iter().any(predicate)
    }
}

impl TelemetrySink for RecordingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub failures: Mutex<Vec<(u64, String)>>,
    pub removals: Mutex<Vec<(FlowEntry, StatusCode)>>,
}

impl FrmListener for RecordingListener {
    fn request_failed(&self, request_id: u64, error: &str) {
        self.failures.lock().push((request_id, error.to_string()));
    }

    fn flow_removed(&self, entry: &FlowEntry, status: &Status) {
        self.removals.lock().push((entry.clone(), status.code()));
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A running manager with its event loop.
pub struct Harness {
    pub frm: ForwardingRulesManager,
    pub programmer: Arc<MockFlowProgrammer>,
    pub telemetry: Arc<RecordingTelemetrySink>,
    shutdown: CancellationToken,
    event_loop: JoinHandle<()>,
}

impl Harness {
    /// Single controller owning every device, default container.
    pub fn start() -> Self {
        Self::start_in(ContainerView::default())
    }

    pub fn start_in(container: ContainerView) -> Self {
        let hub = ClusterHub::new();
        let config = ManagerConfig {
            container_name: container.name().to_string(),
            ..test_config()
        };
        Self::start_with(
            config,
            container,
            hub.join(ControllerId::new("10.0.0.1")),
            Arc::new(flowrules::cluster::AllLocal),
        )
    }

    pub fn start_with(
        config: ManagerConfig,
        container: ContainerView,
        cluster: flowrules::cluster::ClusterMember,
        locality: Arc<dyn LocalityOracle>,
    ) -> Self {
        let programmer = MockFlowProgrammer::new();
        let telemetry = Arc::new(RecordingTelemetrySink::default());
        let collaborators = Collaborators {
            programmer: programmer.clone(),
            cluster,
            locality,
            telemetry: telemetry.clone(),
        };
        let (frm, event_loop) =
            ForwardingRulesManager::new(config, Arc::new(container), collaborators).expect("manager");

        let shutdown = CancellationToken::new();
        let event_loop = tokio::spawn(event_loop.run(shutdown.clone()));
        Self {
            frm,
            programmer,
            telemetry,
            shutdown,
            event_loop,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.event_loop.await.expect("event loop task");
    }
}

pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        distribution_timeout: Duration::from_secs(5),
        worker_pool_size: 4,
        ..ManagerConfig::default()
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Flow builders
// ============================================================================

pub fn node(id: &str) -> NodeId {
    NodeId::new(id)
}

pub fn tcp_dst(port: u16) -> Match {
    Match::new().with(MatchField::TpDst(port))
}

pub fn entry(node_id: &str, name: &str, matching: Match, actions: Vec<Action>) -> FlowEntry {
    FlowEntry::new(node(node_id), Flow::new(matching, actions)).with_name(name)
}

pub fn drop_entry(node_id: &str, name: &str, matching: Match) -> FlowEntry {
    entry(node_id, name, matching, vec![Action::Drop])
}
