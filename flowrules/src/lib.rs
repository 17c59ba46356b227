//! Flowrules - distributed flow-entry reconciliation for a clustered SDN controller
//!
//! This library keeps the flow entries requested by applications consistent
//! with what is actually programmed on network devices. A requested entry is
//! merged with every container flow of its container, the resulting install
//! variants are programmed on the device, and both views are kept in an
//! indexed flow database.
//!
//! In a cluster, only the controller a device is attached to programs it.
//! Requests for devices owned elsewhere travel as work orders through shared
//! replicated tables and the requester waits for the owner's status.
//!
//! # High-Level API
//!
//! ```ignore
//! use flowrules::{Collaborators, ForwardingRulesManager, ManagerConfig};
//! use flowrules::cluster::{ClusterHub, ControllerId};
//! use tokio_util::sync::CancellationToken;
//!
//! let hub = ClusterHub::new();
//! let collaborators = Collaborators {
//!     programmer,
//!     cluster: hub.join(ControllerId::new("controller-1")),
//!     locality,
//!     telemetry: Arc::new(TracingTelemetrySink),
//! };
//! let (frm, event_loop) = ForwardingRulesManager::new(config, container, collaborators)?;
//! let shutdown = CancellationToken::new();
//! tokio::spawn(event_loop.run(shutdown.clone()));
//!
//! let status = frm.install_flow_entry(&entry, DispatchMode::Sync).await;
//! ```

pub mod cluster;
pub mod config;
pub mod container;
pub mod database;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod model;
pub mod programmer;
pub mod static_flows;
pub mod telemetry;

pub use config::ManagerConfig;
pub use container::ContainerView;
pub use engine::{Collaborators, ForwardingRulesManager, FrmListener};
pub use error::FrmError;
pub use event_loop::{FlowEventLoop, FrmEvent};
pub use programmer::{DispatchMode, FlowProgrammer, ProgrammingFuture};

/// Version of the flowrules library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
