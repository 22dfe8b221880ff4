//! The per-endpoint token pump between FPGA DMA and the switch-facing rings.

use flitnet_shmem::{ring_name, Direction, TokenRing};
use flitnet_wire::rate::{RateLimit, BANDWIDTH_FIELD_BITS, NIC_MAX_BANDWIDTH_GBPS};
use flitnet_wire::{regs, TokenGeometry};

use crate::config::NicConfig;
use crate::error::{NicError, Result};
use crate::fpga::{FpgaDma, NicMmio};
use crate::niclog::{niclog, NicLog};

/// The endpoint's epoch buffers: a shared-memory ring pair per direction, or
/// one aliased heap pair in loopback mode (what the endpoint pushes to the
/// FPGA is exactly what it last pulled).
enum TokenBuffers {
    Shmem {
        /// FPGA → switch (`nts`), this side produces.
        read: [TokenRing; 2],
        /// Switch → FPGA (`stn`), this side consumes.
        write: [TokenRing; 2],
    },
    Loopback {
        bufs: [Vec<u8>; 2],
    },
}

impl TokenBuffers {
    fn read_data_mut(&mut self, round: usize) -> &mut [u8] {
        match self {
            Self::Shmem { read, .. } => read[round].data_mut(),
            Self::Loopback { bufs } => &mut bufs[round],
        }
    }

    fn read_data(&self, round: usize) -> &[u8] {
        match self {
            Self::Shmem { read, .. } => read[round].data(),
            Self::Loopback { bufs } => &bufs[round],
        }
    }

    /// Producer release of the freshly pulled epoch toward the switch.
    fn publish_read(&self, round: usize) {
        if let Self::Shmem { read, .. } = self {
            read[round].post();
        }
    }

    /// Spin until the switch has produced this round's inbound epoch.
    fn wait_write_ready(&self, round: usize) {
        if let Self::Shmem { write, .. } = self {
            write[round].wait(1);
        }
    }

    fn write_data(&self, round: usize) -> &[u8] {
        match self {
            Self::Shmem { write, .. } => write[round].data(),
            Self::Loopback { bufs } => &bufs[round],
        }
    }

    /// Consumer release of the inbound buffer back to the switch.
    fn release_write(&self, round: usize) {
        if let Self::Shmem { write, .. } = self {
            write[round].clear();
        }
    }
}

/// Host-side driver for one simulated NIC.
///
/// Owns its platform collaborators and the link buffers; `init` programs the
/// widget and primes the latency pipeline, after which the simulator calls
/// [`tick`](Self::tick) forever.
pub struct NicEndpoint<M, D> {
    mmio: M,
    dma: D,
    dma_addr: u64,
    geom: TokenGeometry,
    cfg: NicConfig,
    rate: RateLimit,
    /// Big-tokens per epoch (`SIMLATENCY_BT`).
    epoch_bigtokens: usize,
    /// Bytes per epoch buffer.
    epoch_bytes: usize,
    buffers: TokenBuffers,
    round: usize,
    niclog: Option<NicLog>,
    iter: u64,
    /// Next expected FPGA token counter (token-verify mode).
    verify_next: u32,
    /// Simulated cycles completed (token-verify trace timestamps).
    elapsed_cycles: u64,
}

impl<M: NicMmio, D: FpgaDma> NicEndpoint<M, D> {
    /// Build an endpoint from a validated configuration.
    ///
    /// Opens (or allocates, in loopback) both epoch buffer pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the link latency is not a whole number of
    /// big-tokens, the bandwidth request exceeds the platform maximum, the
    /// log file cannot be created, or a shared-memory region cannot be set
    /// up.
    pub fn new(
        mmio: M,
        dma: D,
        dma_addr: u64,
        geom: TokenGeometry,
        cfg: NicConfig,
    ) -> Result<Self> {
        geom.validate_latency(cfg.linklatency)?;
        let rate = RateLimit::derive(cfg.netbw, NIC_MAX_BANDWIDTH_GBPS, cfg.netburst)?;
        let epoch_bigtokens = geom.epoch_bigtokens(cfg.linklatency);
        let epoch_bytes = geom.epoch_bytes(cfg.linklatency);

        tracing::info!("NIC endpoint {}: link latency {} cycles", cfg.index, cfg.linklatency);
        tracing::info!("  netbw {} Gbps, netburst {}", cfg.netbw, cfg.netburst);
        tracing::info!("  epoch: {epoch_bigtokens} big-tokens, {epoch_bytes} bytes");
        tracing::info!("  rate limit: {}/{} burst {}", rate.increment, rate.period, rate.burst);

        let niclog = match &cfg.niclog {
            Some(path) => Some(NicLog::create(path)?),
            None => None,
        };

        let buffers = if cfg.loopback {
            tracing::info!("  loopback mode: no peer rings");
            TokenBuffers::Loopback {
                bufs: [vec![0; epoch_bytes], vec![0; epoch_bytes]],
            }
        } else {
            let name = cfg
                .shmemportname
                .as_deref()
                .ok_or(NicError::ShmemNameRequired { index: cfg.index })?;
            let open_pair = |dir| -> Result<[TokenRing; 2]> {
                Ok([
                    TokenRing::open(&ring_name(dir, name, 0), epoch_bytes)?,
                    TokenRing::open(&ring_name(dir, name, 1), epoch_bytes)?,
                ])
            };
            TokenBuffers::Shmem {
                read: open_pair(Direction::NicToSwitch)?,
                write: open_pair(Direction::SwitchToNic)?,
            }
        };

        Ok(Self {
            mmio,
            dma,
            dma_addr,
            geom,
            cfg,
            rate,
            epoch_bigtokens,
            epoch_bytes,
            buffers,
            round: 0,
            niclog,
            iter: 0,
            verify_next: 0,
            elapsed_cycles: 0,
        })
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &NicConfig {
        &self.cfg
    }

    /// Big-tokens moved per epoch.
    pub const fn epoch_bigtokens(&self) -> usize {
        self.epoch_bigtokens
    }

    /// Program the widget and prime the link-latency pipeline.
    ///
    /// The widget pre-injects one token iff a big-token holds exactly one
    /// flit; any other boot state means the RTL and driver disagree about
    /// the link and continuing would corrupt simulated time.
    ///
    /// # Errors
    ///
    /// Returns an error on an MMIO failure, wrong boot token counts, or a
    /// short priming transfer.
    pub fn init(&mut self) -> Result<()> {
        self.mmio.write(regs::MACADDR_UPPER, self.cfg.mac.upper())?;
        self.mmio.write(regs::MACADDR_LOWER, self.cfg.mac.lower())?;
        self.mmio
            .write(regs::RLIMIT_SETTINGS, self.rate.pack(BANDWIDTH_FIELD_BITS))?;

        let outgoing = self.mmio.read(regs::OUTGOING_COUNT)?;
        let incoming = self.mmio.read(regs::INCOMING_COUNT)?;
        let capacity = (self.epoch_bigtokens as u32).saturating_sub(incoming);

        let expected_outgoing = u32::from(self.geom.tokens_per_bigtoken() == 1);
        if capacity != self.epoch_bigtokens as u32 || outgoing != expected_outgoing {
            return Err(NicError::BootTokens { outgoing, capacity });
        }
        tracing::info!("on init, {capacity} token slots available on input");

        // Prime from buffer 1 so round 0 starts on a clean pair.
        let produced = self.dma.push(self.dma_addr, self.buffers.write_data(1))?;
        if produced != self.epoch_bytes {
            return Err(NicError::ShortTransfer {
                op: "push",
                expected: self.epoch_bytes,
                actual: produced,
            });
        }
        Ok(())
    }

    /// Pump full epochs until the FPGA is not ready for one.
    ///
    /// Each round moves exactly one epoch in each direction; if the widget
    /// cannot both supply and absorb a full epoch, the simulator gets
    /// control back and retries on its next tick.
    ///
    /// # Errors
    ///
    /// Returns an error on MMIO failure, short DMA, or a token-verify
    /// mismatch. All are fatal to the simulation.
    pub fn tick(&mut self) -> Result<()> {
        loop {
            let outgoing = self.mmio.read(regs::OUTGOING_COUNT)?;
            let incoming = self.mmio.read(regs::INCOMING_COUNT)?;
            let capacity = (self.epoch_bigtokens as u32).saturating_sub(incoming);
            let tokens = outgoing.min(capacity);
            niclog!(self.niclog, "tokens this round: {tokens}");

            if tokens as usize != self.epoch_bigtokens {
                niclog!(
                    self.niclog,
                    "FAIL: output available {outgoing}, input capacity: {capacity}"
                );
                return Ok(());
            }

            self.iter += 1;
            niclog!(self.niclog, "read fpga iter {}", self.iter);
            let round = self.round;
            let pulled = self
                .dma
                .pull(self.dma_addr, self.buffers.read_data_mut(round))?;
            self.buffers.publish_read(round);

            if self.cfg.token_verify {
                self.verify_tokens(round)?;
            }
            if pulled != self.epoch_bytes {
                return Err(NicError::ShortTransfer {
                    op: "pull",
                    expected: self.epoch_bytes,
                    actual: pulled,
                });
            }

            niclog!(self.niclog, "recv iter {}", self.iter);
            if !self.cfg.loopback {
                self.buffers.wait_write_ready(round);
            }
            niclog!(self.niclog, "done recv iter {}", self.iter);

            let pushed = self.dma.push(self.dma_addr, self.buffers.write_data(round))?;
            self.buffers.release_write(round);
            if pushed != self.epoch_bytes {
                return Err(NicError::ShortTransfer {
                    op: "push",
                    expected: self.epoch_bytes,
                    actual: pushed,
                });
            }

            self.round = (self.round + 1) % 2;
        }
    }

    /// Check the monotonic counter the widget stamps into each big-token's
    /// control lane, and trace every valid outbound flit.
    fn verify_tokens(&mut self, round: usize) -> Result<()> {
        let buf = self.buffers.read_data(round);
        let t = self.geom.tokens_per_bigtoken();
        let stride = self.geom.bigtoken_bytes();

        for bt in 0..self.epoch_bigtokens {
            for k in 0..t {
                let index = bt * t + k;
                if self.geom.is_valid(buf, index) {
                    let flit = self.geom.flit(buf, index);
                    let word = u64::from_le_bytes(flit[..8].try_into().expect("flit word"));
                    niclog!(
                        self.niclog,
                        "sending to other node, valid data chunk: {word:016x}, last {:x}, sendcycle: {:016}",
                        u8::from(self.geom.is_last(buf, index)),
                        self.elapsed_cycles + index as u64
                    );
                }
            }
            let counter =
                u32::from_le_bytes(buf[bt * stride..bt * stride + 4].try_into().expect("counter"));
            if counter != self.verify_next {
                return Err(NicError::TokenVerify {
                    expected: self.verify_next,
                    found: counter,
                });
            }
            self.verify_next = self.verify_next.wrapping_add(1);
        }
        self.elapsed_cycles += self.cfg.linklatency;
        Ok(())
    }
}
