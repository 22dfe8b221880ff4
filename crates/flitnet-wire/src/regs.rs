//! NIC widget MMIO register map.
//!
//! The widget exposes five registers to its host-side driver. Offsets are
//! relative to the widget's MMIO base; the platform layer implementing the
//! driver's MMIO trait resolves them to absolute addresses.

/// Upper 16 bits of the endpoint's little-endian 48-bit MAC address.
pub const MACADDR_UPPER: usize = 0x00;

/// Lower 32 bits of the endpoint's little-endian 48-bit MAC address.
pub const MACADDR_LOWER: usize = 0x04;

/// Packed rate-limit descriptor (see [`crate::rate::RateLimit::pack`]).
pub const RLIMIT_SETTINGS: usize = 0x08;

/// Big-tokens the widget has produced and the host may pull.
pub const OUTGOING_COUNT: usize = 0x0C;

/// Big-tokens currently buffered inbound on the widget.
pub const INCOMING_COUNT: usize = 0x10;
