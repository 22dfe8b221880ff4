//! Error types for wire-model construction and validation

use thiserror::Error;

/// Result type alias for wire-model operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while validating wire-level parameters
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Requested bandwidth exceeds the platform maximum
    #[error("Requested bandwidth {requested} Gbps exceeds platform maximum {maximum} Gbps")]
    BandwidthTooHigh {
        /// Requested bandwidth in Gbps
        requested: u32,
        /// Platform maximum in Gbps
        maximum: u32,
    },

    /// Burst size does not fit the descriptor's 8-bit burst field
    #[error("Burst size {burst} does not fit the descriptor (must be < 256)")]
    BurstTooLarge {
        /// Requested burst size
        burst: u32,
    },

    /// Rate fraction has a zero denominator
    #[error("Rate-limit period must be nonzero")]
    ZeroPeriod,

    /// Link latency is not a whole number of big-tokens
    #[error("Link latency {latency} is not a multiple of {tokens_per_bigtoken} flits per big-token")]
    LatencyNotAligned {
        /// Requested link latency in cycles
        latency: u64,
        /// Flit slots per big-token
        tokens_per_bigtoken: u64,
    },

    /// MAC address string did not parse as six colon-separated hex octets
    #[error("Invalid MAC address: {text:?}")]
    InvalidMac {
        /// The offending input
        text: String,
    },
}
