//! Host-side driver for one simulated NIC endpoint.
//!
//! Each RTL-simulated node carries a NIC widget; this crate is its host-side
//! companion. Once per link-latency epoch it pumps big-tokens in both
//! directions: pulled from FPGA DMA into a shared-memory ring toward the
//! switch, and pushed from the switch's ring back into the FPGA. The pump is
//! gated so that exactly one full epoch moves at a time and simulated time
//! never skews between nodes.
//!
//! The FPGA platform layer is an external collaborator, reached through the
//! [`fpga::NicMmio`] and [`fpga::FpgaDma`] traits. Everything that would
//! desynchronize the cycle-accurate time domain (short DMA, wrong boot
//! token counts, a lost token in verify mode) is fatal.
//!
//! # Quick start
//!
//! ```no_run
//! use flitnet_nic::{NicConfig, NicEndpoint};
//! use flitnet_wire::TokenGeometry;
//!
//! # fn run(mmio: impl flitnet_nic::fpga::NicMmio, dma: impl flitnet_nic::fpga::FpgaDma)
//! # -> flitnet_nic::Result<()> {
//! let args: Vec<String> = std::env::args().collect();
//! let cfg = NicConfig::from_plusargs(0, &args)?;
//! let mut nic = NicEndpoint::new(mmio, dma, 0x2000, TokenGeometry::nic_link(), cfg)?;
//! nic.init()?;
//! loop {
//!     nic.tick()?;
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// token counts fit u32 by construction (the widget's counters are u32)
#![allow(clippy::cast_possible_truncation)]

mod config;
mod endpoint;
mod error;
pub mod fpga;
mod niclog;

pub use config::NicConfig;
pub use endpoint::NicEndpoint;
pub use error::{NicError, Result};
pub use niclog::NicLog;
