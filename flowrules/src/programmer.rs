//! The flow programming service: the southbound collaborator that actually
//! writes flows to devices.
//!
//! Methods return boxed futures so the trait stays object safe and callers
//! can hold an `Arc<dyn FlowProgrammer>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::model::{Flow, NodeId, Status};

/// Whether a device request waits for the device's confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Complete when the device acknowledges (or rejects) the request.
    Sync,
    /// Complete once the request is sent; device errors arrive later as
    /// error reports carrying the request id.
    Async,
}

impl DispatchMode {
    pub fn is_async(self) -> bool {
        self == DispatchMode::Async
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Sync => f.write_str("sync"),
            DispatchMode::Async => f.write_str("async"),
        }
    }
}

/// Future returned by every [`FlowProgrammer`] method.
pub type ProgrammingFuture<'a> = Pin<Box<dyn Future<Output = Status> + Send + 'a>>;

/// Writes flows to devices.
///
/// A successful status carries the device request id, which the manager
/// records to correlate later asynchronous error reports.
pub trait FlowProgrammer: Send + Sync {
    fn add_flow<'a>(&'a self, node: &'a NodeId, flow: &'a Flow, mode: DispatchMode) -> ProgrammingFuture<'a>;

    fn modify_flow<'a>(
        &'a self,
        node: &'a NodeId,
        old: &'a Flow,
        new: &'a Flow,
        mode: DispatchMode,
    ) -> ProgrammingFuture<'a>;

    fn remove_flow<'a>(&'a self, node: &'a NodeId, flow: &'a Flow, mode: DispatchMode) -> ProgrammingFuture<'a>;

    /// Asks the device to confirm all previously sent requests.
    fn send_barrier<'a>(&'a self, node: &'a NodeId, mode: DispatchMode) -> ProgrammingFuture<'a>;
}
