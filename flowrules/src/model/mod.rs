//! Core data model for flow programming.
//!
//! These are plain value types. Nothing in here talks to a device, the
//! cluster, or the event loop.
//!
//! ```text
//!   FlowEntry (requested)  ──derive──►  InstallEntry (per container flow)
//!        │                                   │
//!        └── FlowKey (node, match, priority) └── InstallKey (merged FlowKey, container flow)
//! ```

mod container_flow;
mod entry;
mod flow;
mod matching;
mod node;
mod status;
mod update;

pub use container_flow::ContainerFlow;
pub use entry::{FlowEntry, FlowKey, InstallEntry, InstallKey};
pub use flow::{Action, Flow, DEFAULT_FLOW_PRIORITY};
pub use matching::{IpPrefix, MacAddr, Match, MatchField, MatchType};
pub use node::{NodeId, PortId};
pub use status::{Status, StatusCode};
pub use update::UpdateType;
