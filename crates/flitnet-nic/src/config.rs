//! Endpoint configuration from simulator plusargs.
//!
//! The simulator host passes one argument list to every endpoint; each
//! endpoint picks out its own settings by index, e.g. `+macaddr0=`,
//! `+niclog0=`, `+nic-loopback0`. Unrecognized arguments belong to other
//! endpoints and are ignored.

use std::path::PathBuf;

use flitnet_wire::rate::NIC_MAX_BANDWIDTH_GBPS;
use flitnet_wire::{MacAddr, WireError};

use crate::error::{NicError, Result};

/// Default burst size in big-tokens when `+netburst<N>=` is absent.
const DEFAULT_NETBURST: u32 = 8;

/// Validated configuration of one NIC endpoint.
#[derive(Debug, Clone)]
pub struct NicConfig {
    /// Endpoint index (the `N` in `+macaddr<N>=`).
    pub index: usize,
    /// Per-endpoint log file, if requested.
    pub niclog: Option<PathBuf>,
    /// Loopback mode: inbound and outbound buffers alias, no peer.
    pub loopback: bool,
    /// Endpoint MAC address.
    pub mac: MacAddr,
    /// Requested bandwidth in Gbps.
    pub netbw: u32,
    /// Rate-limiter burst in big-tokens, < 256.
    pub netburst: u32,
    /// Link latency in cycles, > 0 and a multiple of the flits-per-big-token.
    pub linklatency: u64,
    /// Shared-memory port name; required unless loopback.
    pub shmemportname: Option<String>,
    /// Check the FPGA's monotonic token counter on every pulled big-token.
    /// Debug aid; a mismatch is fatal.
    pub token_verify: bool,
}

impl NicConfig {
    /// Parse endpoint `index`'s settings out of the simulator argument list.
    ///
    /// # Errors
    ///
    /// Returns an error on an unparseable value, a missing or zero
    /// `+linklatency<N>=`, a burst that does not fit the descriptor, or a
    /// missing `+shmemportname<N>=` on a non-loopback endpoint.
    pub fn from_plusargs(index: usize, args: &[String]) -> Result<Self> {
        let niclog_key = format!("+niclog{index}=");
        let loopback_key = format!("+nic-loopback{index}");
        let macaddr_key = format!("+macaddr{index}=");
        let netbw_key = format!("+netbw{index}=");
        let netburst_key = format!("+netburst{index}=");
        let linklatency_key = format!("+linklatency{index}=");
        let shmemportname_key = format!("+shmemportname{index}=");

        let mut cfg = Self {
            index,
            niclog: None,
            loopback: false,
            mac: MacAddr::default(),
            netbw: NIC_MAX_BANDWIDTH_GBPS,
            netburst: DEFAULT_NETBURST,
            linklatency: 0,
            shmemportname: None,
            token_verify: false,
        };

        for arg in args {
            if let Some(path) = arg.strip_prefix(&niclog_key) {
                cfg.niclog = Some(PathBuf::from(path));
            } else if arg == &loopback_key {
                cfg.loopback = true;
            } else if let Some(text) = arg.strip_prefix(&macaddr_key) {
                cfg.mac = text.parse().map_err(|e: WireError| {
                    NicError::invalid_plusarg(arg, e.to_string())
                })?;
            } else if let Some(text) = arg.strip_prefix(&netbw_key) {
                cfg.netbw = parse_number(arg, text)?;
            } else if let Some(text) = arg.strip_prefix(&netburst_key) {
                cfg.netburst = parse_number(arg, text)?;
            } else if let Some(text) = arg.strip_prefix(&linklatency_key) {
                cfg.linklatency = parse_number(arg, text)?;
            } else if let Some(name) = arg.strip_prefix(&shmemportname_key) {
                cfg.shmemportname = Some(name.to_string());
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.linklatency == 0 {
            return Err(NicError::LinkLatencyRequired { index: self.index });
        }
        if self.netburst >= 256 {
            return Err(WireError::BurstTooLarge {
                burst: self.netburst,
            }
            .into());
        }
        if !self.loopback && self.shmemportname.is_none() {
            return Err(NicError::ShmemNameRequired { index: self.index });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(arg: &str, text: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    text.parse()
        .map_err(|e: T::Err| NicError::invalid_plusarg(arg, e.to_string()))
}
