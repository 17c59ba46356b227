//! Telemetry for reconciliation observability.
//!
//! The manager emits structured events through a sink abstraction and never
//! decides how they are presented: a deployment may log them, count them, or
//! drop them.
//!
//! # Example
//!
//! ```ignore
//! use flowrules::telemetry::{TelemetryEvent, TelemetrySink};
//!
//! struct CountingSink(std::sync::atomic::AtomicUsize);
//!
//! impl TelemetrySink for CountingSink {
//!     fn emit(&self, _event: TelemetryEvent) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```

use std::time::Duration;

use crate::cluster::ControllerId;
use crate::logging::SYNC_TARGET;
use crate::model::{NodeId, StatusCode, UpdateType};

// =============================================================================
// Telemetry Events
// =============================================================================

/// Events emitted while reconciling flow entries.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryEvent {
    // -------------------------------------------------------------------------
    // Work distribution
    // -------------------------------------------------------------------------
    /// A work order was published for a device owned by another controller.
    OrderIssued { node: NodeId, op: UpdateType },

    /// The owning controller reported a status for our work order.
    OrderCompleted {
        node: NodeId,
        op: UpdateType,
        code: StatusCode,
        waited: Duration,
    },

    /// No status arrived before the distribution timeout.
    OrderTimedOut { node: NodeId, op: UpdateType },

    /// Pending orders were force-completed at shutdown.
    OrdersCancelled { count: usize },

    /// This controller executed a work order on behalf of `requestor`.
    WorkOrderExecuted {
        node: NodeId,
        op: UpdateType,
        requestor: ControllerId,
        code: StatusCode,
    },

    // -------------------------------------------------------------------------
    // Modify strategy
    // -------------------------------------------------------------------------
    /// Install variants were modified pairwise.
    ModifiedInPlace { node: NodeId, variants: usize },

    /// Old variants were removed and new ones added independently.
    ModifyDecoupled {
        node: NodeId,
        removed: usize,
        added: usize,
    },

    /// A pairwise modify failed and earlier pairs were restored.
    ModifyRolledBack { node: NodeId, restored: usize },

    /// Restoring earlier pairs failed; device state is inconsistent.
    ModifyUnrecoverable { node: NodeId },

    // -------------------------------------------------------------------------
    // Device and container events
    // -------------------------------------------------------------------------
    /// Entries were purged after a device went down.
    NodePurged { node: NodeId, entries: usize },

    /// A device reported an asynchronous failure for a request.
    RequestFailed { node: NodeId, request_id: u64 },

    /// Installed entries were re-derived after a container-flow change.
    ContainerFlowsReconciled { reinstalled: usize, failed: usize },
}

impl TelemetryEvent {
    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OrderIssued { .. } => "order_issued",
            Self::OrderCompleted { .. } => "order_completed",
            Self::OrderTimedOut { .. } => "order_timed_out",
            Self::OrdersCancelled { .. } => "orders_cancelled",
            Self::WorkOrderExecuted { .. } => "work_order_executed",
            Self::ModifiedInPlace { .. } => "modified_in_place",
            Self::ModifyDecoupled { .. } => "modify_decoupled",
            Self::ModifyRolledBack { .. } => "modify_rolled_back",
            Self::ModifyUnrecoverable { .. } => "modify_unrecoverable",
            Self::NodePurged { .. } => "node_purged",
            Self::RequestFailed { .. } => "request_failed",
            Self::ContainerFlowsReconciled { .. } => "container_flows_reconciled",
        }
    }
}

// =============================================================================
// Telemetry Sink Trait
// =============================================================================

/// Sink for telemetry events.
///
/// Events are emitted from the event loop, worker tasks and caller tasks
/// concurrently; implementations must be fast and non-blocking.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

// =============================================================================
// Built-in Sink Implementations
// =============================================================================

/// No-op sink for when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::OrderIssued { node, op } => {
                tracing::debug!(target: SYNC_TARGET, node = %node, op = %op, "Work order issued");
            }
            TelemetryEvent::OrderCompleted {
                node,
                op,
                code,
                waited,
            } => {
                tracing::debug!(
                    target: SYNC_TARGET,
                    node = %node,
                    op = %op,
                    code = %code,
                    waited_ms = waited.as_millis(),
                    "Work order completed"
                );
            }
            TelemetryEvent::OrderTimedOut { node, op } => {
                tracing::warn!(target: SYNC_TARGET, node = %node, op = %op, "Work order timed out");
            }
            TelemetryEvent::OrdersCancelled { count } => {
                tracing::debug!(target: SYNC_TARGET, count, "Pending work orders cancelled");
            }
            TelemetryEvent::WorkOrderExecuted {
                node,
                op,
                requestor,
                code,
            } => {
                tracing::debug!(
                    target: SYNC_TARGET,
                    node = %node,
                    op = %op,
                    requestor = %requestor,
                    code = %code,
                    "Executed remote work order"
                );
            }
            TelemetryEvent::ModifiedInPlace { node, variants } => {
                tracing::debug!(node = %node, variants, "Modified flow entry in place");
            }
            TelemetryEvent::ModifyDecoupled {
                node,
                removed,
                added,
            } => {
                tracing::debug!(node = %node, removed, added, "Modified flow entry by remove and add");
            }
            TelemetryEvent::ModifyRolledBack { node, restored } => {
                tracing::debug!(node = %node, restored, "Rolled back partial modify");
            }
            TelemetryEvent::ModifyUnrecoverable { node } => {
                tracing::debug!(node = %node, "Partial modify could not be rolled back");
            }
            TelemetryEvent::NodePurged { node, entries } => {
                tracing::debug!(node = %node, entries, "Purged flow entries for node");
            }
            TelemetryEvent::RequestFailed { node, request_id } => {
                tracing::debug!(node = %node, request_id, "Device reported request failure");
            }
            TelemetryEvent::ContainerFlowsReconciled {
                reinstalled,
                failed,
            } => {
                tracing::debug!(reinstalled, failed, "Reconciled entries with container flows");
            }
        }
    }
}
