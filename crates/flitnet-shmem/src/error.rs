//! Error types for shared-memory ring operations

use thiserror::Error;

/// Result type alias for ring operations
pub type Result<T> = std::result::Result<T, ShmemError>;

/// Errors that can occur while creating or attaching token rings
#[derive(Debug, Error)]
pub enum ShmemError {
    /// `shm_open` failed for a region
    #[error("Cannot open shared-memory region {name}: {source}")]
    Open {
        /// Region name
        name: String,
        /// Underlying OS error
        source: rustix::io::Errno,
    },

    /// `ftruncate` failed while sizing a region
    #[error("Cannot size shared-memory region {name} to {bytes} bytes: {source}")]
    Size {
        /// Region name
        name: String,
        /// Requested size including the handshake byte
        bytes: usize,
        /// Underlying OS error
        source: rustix::io::Errno,
    },

    /// `mmap` failed for a region
    #[error("Cannot map shared-memory region {name}: {source}")]
    Map {
        /// Region name
        name: String,
        /// Underlying OS error
        source: rustix::io::Errno,
    },
}
