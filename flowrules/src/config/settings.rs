//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing logic.

use std::path::PathBuf;

/// Complete configuration loaded from frm.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub container: ContainerSettings,
    pub distribution: DistributionSettings,
    pub event_loop: EventLoopSettings,
    pub flows: FlowSettings,
    pub logging: LoggingSettings,
}

/// `[container]`
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Container served by this instance ("default" owns the whole network)
    pub name: String,
}

/// `[distribution]`
#[derive(Debug, Clone)]
pub struct DistributionSettings {
    /// Seconds to wait for a remote controller to execute a work order
    pub timeout_secs: u64,
}

/// `[event_loop]`
#[derive(Debug, Clone)]
pub struct EventLoopSettings {
    /// Maximum concurrently running off-loop jobs
    pub worker_pool_size: usize,
}

/// `[flows]`
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Keep requested entries in the database when a device goes down
    pub preserve_on_node_down: bool,
}

/// `[logging]`
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}
