//! Runtime switch configuration.
//!
//! The port list and MAC table are runtime configuration, loaded once at
//! startup. The YAML file names every downlink and uplink in port order and
//! points at the MAC table file:
//!
//! ```yaml
//! mac_table: mac_table.txt
//! downlinks:
//!   - shmem: { name: slot0 }
//!   - socket: { addr: "0.0.0.0:10100" }
//!   - ssh: { local_port: 10200 }
//! uplinks:
//!   - socket: { addr: "parent-switch:10100" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use flitnet_wire::TokenGeometry;

use crate::backends::{ShmemBackend, SocketBackend, SshBackend};
use crate::error::Result;
use crate::port::{Port, PortBackend};
use crate::table::Topology;

/// One port's transport, in YAML as an externally tagged variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSpec {
    /// Shared-memory peer on this host.
    Shmem {
        /// Region name component (`/port_nts<name>_<j>` / `/port_stn<name>_<j>`).
        name: String,
    },
    /// TCP peer: downlinks listen on `addr`, uplinks connect to it.
    Socket {
        /// Bind or connect address.
        addr: String,
    },
    /// Remote NIC endpoint through a locally forwarded socket.
    Ssh {
        /// Forwarded local TCP port.
        local_port: u16,
    },
}

/// Topology and transports of one switch process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Path to the MAC table text file.
    pub mac_table: PathBuf,
    /// Downlink ports, in port order starting at 0.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub downlinks: Vec<PortSpec>,
    /// Uplink ports, in port order after the downlinks.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub uplinks: Vec<PortSpec>,
    /// Optional egress buffer cap in flits; overflowing packets are dropped.
    #[serde(default)]
    pub output_buf_flits: Option<u64>,
}

impl SwitchConfig {
    /// Load the YAML configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;
        tracing::info!(
            "switch config {}: {} downlinks, {} uplinks",
            path.display(),
            config.downlinks.len(),
            config.uplinks.len()
        );
        Ok(config)
    }

    /// The topology this configuration describes.
    pub fn topology(&self) -> Topology {
        Topology {
            downlinks: self.downlinks.len(),
            uplinks: self.uplinks.len(),
        }
    }

    /// Construct every port's live backend, downlinks first. Blocks until
    /// socket peers connect and uplink regions exist, as the fabric comes up
    /// in lockstep anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if any transport cannot be established.
    pub fn build_ports(&self, geom: &TokenGeometry, link_latency: u64) -> Result<Vec<Port>> {
        let epoch_bytes = geom.epoch_bytes(link_latency);
        let mut ports = Vec::with_capacity(self.topology().num_ports());

        for (index, spec) in self.downlinks.iter().enumerate() {
            let backend: Box<dyn PortBackend> = match spec {
                PortSpec::Shmem { name } => Box::new(ShmemBackend::downlink(name, epoch_bytes)?),
                PortSpec::Socket { addr } => {
                    Box::new(SocketBackend::listen(addr, index, epoch_bytes)?)
                }
                PortSpec::Ssh { local_port } => {
                    Box::new(SshBackend::forwarded(*local_port, index, epoch_bytes)?)
                }
            };
            // the host-network bridge is never bandwidth-modeled
            let throttled = !matches!(spec, PortSpec::Ssh { .. });
            ports.push(Port::new(index, throttled, backend));
        }

        for (offset, spec) in self.uplinks.iter().enumerate() {
            let index = self.downlinks.len() + offset;
            let backend: Box<dyn PortBackend> = match spec {
                PortSpec::Shmem { name } => Box::new(ShmemBackend::uplink(name, epoch_bytes)?),
                PortSpec::Socket { addr } => {
                    Box::new(SocketBackend::connect(addr, index, epoch_bytes)?)
                }
                PortSpec::Ssh { local_port } => {
                    Box::new(SshBackend::forwarded(*local_port, index, epoch_bytes)?)
                }
            };
            ports.push(Port::new(index, false, backend));
        }

        Ok(ports)
    }
}
