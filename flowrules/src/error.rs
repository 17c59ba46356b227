//! Infrastructure errors.
//!
//! Flow operations report expected failures as [`Status`] values; these
//! errors cover the plumbing underneath them.

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::model::{Status, StatusCode};

#[derive(Debug, Error)]
pub enum FrmError {
    /// The event loop is no longer accepting events.
    #[error("Flow event loop has stopped")]
    EventLoopStopped,

    /// The shared cluster tables could not be opened.
    #[error("Cluster table error: {0}")]
    Cluster(#[from] ClusterError),

    /// The configuration names a different container than the view it was
    /// handed.
    #[error("Configured container {configured} does not match container view {view}")]
    ContainerMismatch { configured: String, view: String },
}

impl From<FrmError> for Status {
    fn from(err: FrmError) -> Self {
        Status::new(StatusCode::InternalError, err.to_string())
    }
}
