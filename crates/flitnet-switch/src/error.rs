//! Error types for the switch engine

use thiserror::Error;

/// Result type alias for switch operations
pub type Result<T> = std::result::Result<T, SwitchError>;

/// Errors that can occur while configuring or running the switch.
///
/// Anything that fires after startup desynchronizes the simulated time
/// domain and is fatal; the engine has no local recovery.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Wire-level parameter validation failed
    #[error(transparent)]
    Wire(#[from] flitnet_wire::WireError),

    /// Shared-memory ring setup failed
    #[error(transparent)]
    Shmem(#[from] flitnet_shmem::ShmemError),

    /// Switch configuration file could not be read
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Switch configuration file did not parse
    #[error("Cannot parse switch configuration: {source}")]
    Config {
        /// Underlying YAML error
        #[from]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// MAC table file had a malformed line
    #[error("MAC table line {line}: {reason}")]
    MacTable {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// A destination MAC mapped to "any uplink" on a switch with no uplinks
    #[error("Destination MAC {mac:#06x} routes to an uplink, but this switch has none")]
    UnroutableMac {
        /// Low 16 bits of the destination MAC
        mac: u16,
    },

    /// A port's transport failed mid-epoch
    #[error("Port {port} transport error: {source}")]
    Transport {
        /// Port index
        port: usize,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A per-port phase worker panicked
    #[error("Port worker panicked during phase {phase}")]
    Worker {
        /// The phase that lost a worker
        phase: &'static str,
    },
}

impl SwitchError {
    /// Create an invalid-configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a transport error for one port
    pub fn transport(port: usize, source: std::io::Error) -> Self {
        Self::Transport { port, source }
    }
}
