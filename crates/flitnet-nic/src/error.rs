//! Error types for the NIC endpoint driver

use thiserror::Error;

/// Result type alias for NIC endpoint operations
pub type Result<T> = std::result::Result<T, NicError>;

/// Errors that can occur while configuring or pumping a NIC endpoint.
///
/// Every variant except the configuration ones corrupts the cycle-accurate
/// invariant; callers must treat them as fatal.
#[derive(Debug, Error)]
pub enum NicError {
    /// Wire-level parameter validation failed
    #[error(transparent)]
    Wire(#[from] flitnet_wire::WireError),

    /// Shared-memory ring setup failed
    #[error(transparent)]
    Shmem(#[from] flitnet_shmem::ShmemError),

    /// A recognized plusarg carried an unparseable value
    #[error("Invalid plusarg {arg:?}: {reason}")]
    InvalidPlusarg {
        /// The offending argument
        arg: String,
        /// Why it failed to parse
        reason: String,
    },

    /// `+linklatency<N>=` missing or zero
    #[error("Endpoint {index} requires +linklatency{index}= with a positive cycle count")]
    LinkLatencyRequired {
        /// Endpoint index
        index: usize,
    },

    /// Non-loopback endpoint without `+shmemportname<N>=`
    #[error("Endpoint {index} requires +shmemportname{index}= unless loopback is enabled")]
    ShmemNameRequired {
        /// Endpoint index
        index: usize,
    },

    /// Widget token counters held the wrong values on boot
    #[error(
        "Incorrect tokens on boot: produced tokens available {outgoing}, input slots available {capacity}"
    )]
    BootTokens {
        /// Observed `outgoing_count`
        outgoing: u32,
        /// Observed input capacity (`SIMLATENCY_BT − incoming_count`)
        capacity: u32,
    },

    /// A DMA transfer moved fewer bytes than requested
    #[error("Short DMA {op}: moved {actual} bytes, wanted {expected} bytes")]
    ShortTransfer {
        /// `"pull"` or `"push"`
        op: &'static str,
        /// Bytes requested
        expected: usize,
        /// Bytes moved
        actual: usize,
    },

    /// Token-verify found a gap in the FPGA's token counter
    #[error("Token lost on FPGA interface: expected counter {expected}, found {found}")]
    TokenVerify {
        /// Next counter value the host expected
        expected: u32,
        /// Counter value actually read
        found: u32,
    },

    /// Platform collaborator (MMIO or DMA layer) failure
    #[error("Platform error: {reason}")]
    Platform {
        /// Reason reported by the platform layer
        reason: String,
    },

    /// I/O error (NIC log file)
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl NicError {
    /// Create a platform-collaborator error
    pub fn platform(reason: impl Into<String>) -> Self {
        Self::Platform {
            reason: reason.into(),
        }
    }

    /// Create an invalid-plusarg error
    pub fn invalid_plusarg(arg: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPlusarg {
            arg: arg.into(),
            reason: reason.into(),
        }
    }
}
