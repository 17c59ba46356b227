//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::container::DEFAULT_CONTAINER_NAME;

// =============================================================================
// CPU helpers
// =============================================================================

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default worker pool size: max(num_cpus, 2)
pub fn default_worker_pool_size() -> usize {
    num_cpus().max(MIN_WORKER_POOL_SIZE)
}

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_CONTAINER: &str = DEFAULT_CONTAINER_NAME;

/// Seconds a requester waits for the owning controller's status.
pub const DEFAULT_DISTRIBUTION_TIMEOUT_SECS: u64 = 30;

pub const MIN_WORKER_POOL_SIZE: usize = 2;
pub const MAX_WORKER_POOL_SIZE: usize = 256;

pub const DEFAULT_PRESERVE_ON_NODE_DOWN: bool = false;

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "flowrules.log";

/// Clamps the worker pool size into range and logs a warning if clamped.
pub(super) fn clamp_worker_pool_size(value: usize) -> usize {
    let clamped = value.clamp(MIN_WORKER_POOL_SIZE, MAX_WORKER_POOL_SIZE);
    if clamped != value {
        tracing::warn!(
            requested = value,
            min = MIN_WORKER_POOL_SIZE,
            max = MAX_WORKER_POOL_SIZE,
            "worker_pool_size out of range, clamping to {}",
            clamped
        );
    }
    clamped
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            container: ContainerSettings {
                name: DEFAULT_CONTAINER.to_string(),
            },
            distribution: DistributionSettings {
                timeout_secs: DEFAULT_DISTRIBUTION_TIMEOUT_SECS,
            },
            event_loop: EventLoopSettings {
                worker_pool_size: default_worker_pool_size(),
            },
            flows: FlowSettings {
                preserve_on_node_down: DEFAULT_PRESERVE_ON_NODE_DOWN,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
