//! Multi-port software switch for the co-simulation fabric.
//!
//! Once per link-latency epoch the switch drains one epoch of flits from
//! every port, reassembles them into packets, reorders all packets globally
//! by arrival timestamp, routes them by destination MAC (unicast or
//! broadcast), and refills every port's outbound epoch honoring the
//! switching-latency floor and the per-port bandwidth throttle. Ports fan
//! out to peers over shared memory, TCP sockets, or SSH-forwarded sockets.
//!
//! The `switch` binary wires this up from the command line:
//!
//! ```text
//! switch <LINK_LATENCY> <SWITCH_LATENCY> <BANDWIDTH_GBPS>
//! ```
//!
//! with port topology and the MAC table coming from `switchconfig.yaml`
//! (override with `$SWITCHCONFIG`).

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
mod config;
mod engine;
mod error;
mod packet;
mod port;
mod table;

pub use config::{PortSpec, SwitchConfig};
pub use engine::SwitchEngine;
pub use error::{Result, SwitchError};
pub use packet::SwitchPacket;
pub use port::{Port, PortBackend, Throttle};
pub use table::{MacTable, Topology, MAC_TABLE_SIZE};
