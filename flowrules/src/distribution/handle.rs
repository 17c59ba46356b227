//! Completion handles for distributed work orders.
//!
//! The requesting controller registers a [`StatusHandle`] in its
//! [`WorkMonitor`] before publishing an order. The handle completes exactly
//! once: when the owner's status arrives, when the timeout expires, or
//! when the monitor is cancelled at shutdown.
//!
//! ```text
//!   register ──► Issued ──wait──► Awaiting ──┬── status ───► Completed
//!                                            ├── timeout ──► TimedOut
//!                                            └── shutdown ─► Cancelled
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use super::order::DistributionOrder;
use crate::model::{Status, StatusCode};

/// Lifecycle of a distributed request as seen by its requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Issued,
    Awaiting,
    Completed,
    TimedOut,
    Cancelled,
}

/// Table of outstanding orders awaiting a remote status.
#[derive(Clone, Default)]
pub struct WorkMonitor {
    pending: Arc<DashMap<DistributionOrder, oneshot::Sender<Status>>>,
}

impl WorkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `order` and returns the handle its status will be delivered to.
    ///
    /// Re-registering an identical order replaces the previous registration.
    pub fn register(&self, order: DistributionOrder) -> StatusHandle {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(order.clone(), tx);
        StatusHandle {
            order,
            receiver: Some(rx),
            state: RequestState::Issued,
            outcome: None,
            monitor: self.clone(),
        }
    }

    /// Delivers `status` to the handle registered for `order`.
    ///
    /// Returns false if nothing was registered (already completed, timed out
    /// or never ours).
    pub fn complete(&self, order: &DistributionOrder, status: Status) -> bool {
        match self.pending.remove(order) {
            Some((_, sender)) => {
                // Receiver may have timed out in the meantime; that is fine.
                let _ = sender.send(status);
                true
            }
            None => false,
        }
    }

    /// Drops the registration for `order` without completing it.
    pub fn abandon(&self, order: &DistributionOrder) -> bool {
        self.pending.remove(order).is_some()
    }

    /// Force-completes every pending handle as cancelled.
    pub fn cancel_all(&self) -> usize {
        let orders: Vec<DistributionOrder> = self.pending.iter().map(|e| e.key().clone()).collect();
        orders
            .iter()
            .filter(|order| self.pending.remove(*order).is_some())
            .count()
    }

    pub fn is_pending(&self, order: &DistributionOrder) -> bool {
        self.pending.contains_key(order)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Single-assignment slot for the status of a distributed request.
pub struct StatusHandle {
    order: DistributionOrder,
    receiver: Option<oneshot::Receiver<Status>>,
    state: RequestState,
    outcome: Option<Status>,
    monitor: WorkMonitor,
}

impl StatusHandle {
    pub fn order(&self) -> &DistributionOrder {
        &self.order
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Waits for the status, up to `timeout` if given.
    ///
    /// On timeout the registration is removed so a late status is ignored,
    /// and `TIMEOUT` is returned. A cancelled request yields `UNDEFINED`.
    /// Once resolved, later calls return the same status.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Status {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(receiver) = self.receiver.take() else {
            return Status::from(StatusCode::Undefined);
        };
        self.state = RequestState::Awaiting;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.monitor.abandon(&self.order);
                    return self.resolve(
                        RequestState::TimedOut,
                        Status::new(StatusCode::Timeout, "Distributed request timed out"),
                    );
                }
            },
            None => receiver.await,
        };

        match received {
            Ok(status) => self.resolve(RequestState::Completed, status),
            Err(_) => self.resolve(
                RequestState::Cancelled,
                Status::new(StatusCode::Undefined, "Distributed request cancelled"),
            ),
        }
    }

    fn resolve(&mut self, state: RequestState, status: Status) -> Status {
        self.state = state;
        self.outcome = Some(status.clone());
        status
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.monitor.abandon(&self.order);
        }
    }
}
