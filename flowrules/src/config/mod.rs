//! Configuration for the forwarding rules manager.
//!
//! Settings live in an INI file (`frm.ini`):
//!
//! ```ini
//! [container]
//! name = default
//!
//! [distribution]
//! timeout_secs = 30
//!
//! [event_loop]
//! worker_pool_size = 8
//!
//! [flows]
//! preserve_on_node_down = false
//!
//! [logging]
//! directory = logs
//! file = flowrules.log
//! ```
//!
//! [`ConfigFile`] mirrors the file; [`ManagerConfig`] is the runtime view the
//! manager consumes.

mod defaults;
mod file;
mod parser;
mod settings;

use std::time::Duration;

pub use defaults::*;
pub use file::{ConfigFileError, CONFIG_FILE_NAME};
pub use settings::{
    ConfigFile, ContainerSettings, DistributionSettings, EventLoopSettings, FlowSettings, LoggingSettings,
};

/// Runtime configuration of a [`ForwardingRulesManager`](crate::ForwardingRulesManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Container served by this instance.
    pub container_name: String,
    /// How long to wait for a work order sent to another controller.
    pub distribution_timeout: Duration,
    /// Concurrent off-loop jobs (remote work orders, replays, sweeps).
    pub worker_pool_size: usize,
    /// Keep requested entries when their device goes down.
    pub preserve_on_node_down: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&ConfigFile::default())
    }
}

impl From<&ConfigFile> for ManagerConfig {
    fn from(file: &ConfigFile) -> Self {
        Self {
            container_name: file.container.name.clone(),
            distribution_timeout: Duration::from_secs(file.distribution.timeout_secs),
            worker_pool_size: file.event_loop.worker_pool_size,
            preserve_on_node_down: file.flows.preserve_on_node_down,
        }
    }
}
