//! Switch ports: the backend seam plus the common per-port machinery.
//!
//! A backend moves whole epochs between the port's buffers and its peer
//! (shared memory, TCP, or a forwarded socket). Everything above the
//! buffers is identical across backends and lives on [`Port`]: packet
//! assembly on ingress, timestamp- and throttle-honoring flit placement on
//! egress.

use std::collections::VecDeque;

use flitnet_wire::rate::{RateLimit, SWITCH_MAX_BANDWIDTH_GBPS};
use flitnet_wire::TokenGeometry;

use crate::error::{Result, SwitchError};
use crate::packet::SwitchPacket;

/// Epoch transport for one port.
///
/// `recv` and `send` block until their epoch has moved; `tick_pre`/`tick`
/// are the epoch-boundary hooks backends use for buffer management (the
/// shared-memory backend swaps its double buffers there).
pub trait PortBackend: Send {
    /// This epoch's inbound buffer.
    fn input(&self) -> &[u8];

    /// This epoch's outbound buffer.
    fn output(&self) -> &[u8];

    /// This epoch's outbound buffer, writable.
    fn output_mut(&mut self) -> &mut [u8];

    /// Obtain exactly one epoch from the peer into the input buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails; a silent peer is an
    /// indefinite block, not an error.
    fn recv(&mut self) -> Result<()>;

    /// Flush the output buffer (exactly one epoch) to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn send(&mut self) -> Result<()>;

    /// Epoch-boundary hook before the switching phases.
    fn tick_pre(&mut self) {}

    /// Epoch-boundary hook after the epoch's send.
    fn tick(&mut self) {}
}

/// Per-port egress bandwidth throttle: at most `numer` valid flits per
/// `denom` consecutive slots, bucket depth one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    /// Valid slots granted per period.
    pub numer: u64,
    /// Period length in slots.
    pub denom: u64,
}

impl Throttle {
    /// Reduce `bandwidth / 200 Gbps` to the throttle fraction.
    ///
    /// # Errors
    ///
    /// Returns an error if `bandwidth` is zero or exceeds the switch port
    /// maximum.
    pub fn derive(bandwidth: u32) -> Result<Self> {
        if bandwidth == 0 {
            return Err(SwitchError::invalid_config("bandwidth must be positive"));
        }
        let rate = RateLimit::derive(bandwidth, SWITCH_MAX_BANDWIDTH_GBPS, 1)?;
        Ok(Self {
            numer: u64::from(rate.increment),
            denom: u64::from(rate.period),
        })
    }

    /// Full line rate: every slot may carry a valid flit.
    pub const fn line_rate() -> Self {
        Self { numer: 1, denom: 1 }
    }
}

/// One switch port: a backend plus the packet queues every backend shares.
pub struct Port {
    index: usize,
    /// Downlinks are throttled; uplinks run at line rate.
    throttled: bool,
    backend: Box<dyn PortBackend>,
    /// Packet currently being assembled; survives epoch boundaries when a
    /// frame straddles them.
    input_in_progress: Option<SwitchPacket>,
    /// Packets fully received this epoch, in arrival order.
    pub(crate) inputqueue: VecDeque<SwitchPacket>,
    /// Packets awaiting emission, in timestamp order (the serial reorder
    /// phase inserts globally sorted).
    pub(crate) outputqueue: VecDeque<SwitchPacket>,
}

impl Port {
    /// Wrap a backend as port `index`.
    #[must_use]
    pub fn new(index: usize, throttled: bool, backend: Box<dyn PortBackend>) -> Self {
        Self {
            index,
            throttled,
            backend,
            input_in_progress: None,
            inputqueue: VecDeque::new(),
            outputqueue: VecDeque::new(),
        }
    }

    /// Port index.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The port's transport, e.g. for inspecting the outbound epoch.
    pub fn backend(&self) -> &dyn PortBackend {
        self.backend.as_ref()
    }

    pub(crate) fn recv(&mut self) -> Result<()> {
        self.backend.recv()
    }

    pub(crate) fn send(&mut self) -> Result<()> {
        self.backend.send()
    }

    pub(crate) fn tick_pre(&mut self) {
        self.backend.tick_pre();
    }

    pub(crate) fn tick(&mut self) {
        self.backend.tick();
    }

    /// Phase B: invalidate every slot of the outbound epoch, so an untouched
    /// slot reads as "no flit this cycle" on the peer.
    pub(crate) fn setup_send_buf(&mut self, geom: &TokenGeometry) {
        geom.clear_controls(self.backend.output_mut());
    }

    /// Phase C: decode the inbound epoch into packets.
    ///
    /// A valid flit with no packet in progress starts one, stamped with its
    /// arrival cycle plus the switching latency; `last` seals it into the
    /// input queue.
    pub(crate) fn absorb_input(
        &mut self,
        geom: &TokenGeometry,
        epoch_start: u64,
        switch_latency: u64,
        link_latency: u64,
    ) {
        let index = self.index;
        let input = self.backend.input();
        #[allow(clippy::cast_possible_truncation)]
        for slot in 0..link_latency as usize {
            if !geom.is_valid(input, slot) {
                continue;
            }
            let mut packet = match self.input_in_progress.take() {
                Some(packet) => packet,
                None => SwitchPacket::new(epoch_start + slot as u64 + switch_latency, index, geom),
            };
            packet.push_flit(geom.flit(input, slot));
            if geom.is_last(input, slot) {
                tracing::trace!("port {index}: packet of {} flits sealed", packet.flits_written());
                self.inputqueue.push_back(packet);
            } else {
                self.input_in_progress = Some(packet);
            }
        }
    }

    /// Phase E: drain the output queue into the outbound epoch.
    ///
    /// Three constraints bound each placement: a packet's first flit may not
    /// land before `timestamp − epoch_start`; the throttle leaves
    /// `denom − numer` of every `denom` slots invalid; and with a buffer cap
    /// configured, a packet that would have overflowed the modeled egress
    /// buffer before its first flit left is dropped. A packet that runs out
    /// of epoch stays at the head with `amt_read` advanced.
    pub(crate) fn write_flits_to_output(
        &mut self,
        geom: &TokenGeometry,
        epoch_start: u64,
        link_latency: u64,
        throttle: Throttle,
        output_limit: Option<u64>,
    ) {
        let out = self.backend.output_mut();
        let maxtime = epoch_start + link_latency;
        let mut flits_written: u64 = 0;

        while let Some(mut packet) = self.outputqueue.pop_front() {
            // queue is timestamp-sorted: nothing later is due either
            if packet.timestamp >= maxtime {
                self.outputqueue.push_front(packet);
                break;
            }

            if let Some(limit) = output_limit {
                #[allow(clippy::cast_possible_wrap)]
                let lag = (epoch_start + flits_written) as i64 - packet.timestamp as i64;
                if packet.amt_read == 0 && lag > limit as i64 {
                    tracing::warn!(
                        "port {}: egress buffer overflow, dropping packet (intended cycle {}, now {}, cap {} flits)",
                        self.index,
                        packet.timestamp,
                        epoch_start + flits_written,
                        limit
                    );
                    continue;
                }
            }

            // advance to the packet's earliest legal slot
            flits_written = flits_written.max(packet.timestamp.saturating_sub(epoch_start));

            let total = packet.flits_written();
            let mut i = packet.amt_read;
            while i < total && flits_written < link_latency {
                #[allow(clippy::cast_possible_truncation)]
                let slot = flits_written as usize;
                geom.set_last(out, slot, i + 1 == total);
                geom.set_valid(out, slot);
                geom.write_flit(out, slot, packet.flit(i));
                i += 1;

                if !self.throttled {
                    flits_written += 1;
                } else if i as u64 % throttle.numer == 0 {
                    flits_written += throttle.denom - throttle.numer + 1;
                } else {
                    flits_written += 1;
                }
            }

            if i < total {
                // out of epoch; resume here next time
                packet.amt_read = i;
                self.outputqueue.push_front(packet);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed in-memory epoch buffers; `recv`/`send` are no-ops.
    struct MemBackend {
        input: Vec<u8>,
        output: Vec<u8>,
    }

    impl MemBackend {
        fn new(epoch_bytes: usize) -> Self {
            Self {
                input: vec![0; epoch_bytes],
                output: vec![0; epoch_bytes],
            }
        }
    }

    impl PortBackend for MemBackend {
        fn input(&self) -> &[u8] {
            &self.input
        }
        fn output(&self) -> &[u8] {
            &self.output
        }
        fn output_mut(&mut self) -> &mut [u8] {
            &mut self.output
        }
        fn recv(&mut self) -> Result<()> {
            Ok(())
        }
        fn send(&mut self) -> Result<()> {
            Ok(())
        }
    }

    const GEOM: TokenGeometry = TokenGeometry::switch_link();
    const LINK: u64 = 70;

    fn port_with_input(fill: impl FnOnce(&mut Vec<u8>)) -> Port {
        let mut backend = MemBackend::new(GEOM.epoch_bytes(LINK));
        fill(&mut backend.input);
        Port::new(0, true, Box::new(backend))
    }

    fn flit_payload(tag: u8) -> [u8; 8] {
        [tag; 8]
    }

    #[test]
    fn assembles_one_packet_per_last_flit() {
        let mut port = port_with_input(|input| {
            for slot in 0..3 {
                GEOM.write_flit(input, slot, &flit_payload(slot as u8 + 1));
                GEOM.set_valid(input, slot);
            }
            GEOM.set_last(input, 2, true);
            // second packet, one flit, later in the epoch
            GEOM.write_flit(input, 9, &flit_payload(9));
            GEOM.set_valid(input, 9);
            GEOM.set_last(input, 9, true);
        });

        port.absorb_input(&GEOM, 700, 35, LINK);
        assert_eq!(port.inputqueue.len(), 2);

        let first = &port.inputqueue[0];
        assert_eq!(first.timestamp, 700 + 0 + 35);
        assert_eq!(first.sender, 0);
        assert_eq!(first.flits_written(), 3);
        assert_eq!(first.flit(1), &flit_payload(2));

        let second = &port.inputqueue[1];
        assert_eq!(second.timestamp, 700 + 9 + 35);
        assert_eq!(second.flits_written(), 1);
    }

    #[test]
    fn partial_packet_survives_the_epoch_boundary() {
        let mut port = port_with_input(|input| {
            let last = LINK as usize - 1;
            GEOM.write_flit(input, last, &flit_payload(1));
            GEOM.set_valid(input, last);
            // no last bit: frame continues next epoch
        });
        port.absorb_input(&GEOM, 0, 35, LINK);
        assert!(port.inputqueue.is_empty());
        assert!(port.input_in_progress.is_some());

        // next epoch carries the closing flit at slot 0
        let mut backend = MemBackend::new(GEOM.epoch_bytes(LINK));
        GEOM.write_flit(&mut backend.input, 0, &flit_payload(2));
        GEOM.set_valid(&mut backend.input, 0);
        GEOM.set_last(&mut backend.input, 0, true);
        port.backend = Box::new(backend);
        port.absorb_input(&GEOM, LINK, 35, LINK);

        assert!(port.input_in_progress.is_none());
        assert_eq!(port.inputqueue.len(), 1);
        let packet = &port.inputqueue[0];
        // stamped where its first flit arrived, one epoch earlier
        assert_eq!(packet.timestamp, (LINK - 1) + 35);
        assert_eq!(packet.flits_written(), 2);
        assert_eq!(packet.flit(1), &flit_payload(2));
    }

    #[test]
    fn emits_at_the_packet_timestamp() {
        let mut port = port_with_input(|_| {});
        let mut packet = SwitchPacket::new(35, 1, &GEOM);
        packet.push_flit(&flit_payload(5));
        port.outputqueue.push_back(packet);
        port.throttled = false;

        port.write_flits_to_output(&GEOM, 0, LINK, Throttle::line_rate(), None);
        let out = port.backend.output();
        for slot in 0..35 {
            assert!(!GEOM.is_valid(out, slot), "slot {slot} must stay invalid");
        }
        assert!(GEOM.is_valid(out, 35));
        assert!(GEOM.is_last(out, 35));
        assert_eq!(GEOM.flit(out, 35), &flit_payload(5));
        assert!(port.outputqueue.is_empty());
    }

    #[test]
    fn half_rate_throttle_interleaves_slots() {
        let mut port = port_with_input(|_| {});
        let mut packet = SwitchPacket::new(0, 1, &GEOM);
        for _ in 0..10 {
            packet.push_flit(&flit_payload(0xAB));
        }
        port.outputqueue.push_back(packet);

        port.write_flits_to_output(&GEOM, 0, LINK, Throttle { numer: 1, denom: 2 }, None);
        let out = port.backend.output();
        let valid: Vec<usize> = (0..LINK as usize).filter(|&s| GEOM.is_valid(out, s)).collect();
        assert_eq!(valid, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
        assert!(GEOM.is_last(out, 18));
    }

    #[test]
    fn uplinks_ignore_the_throttle() {
        let mut port = port_with_input(|_| {});
        port.throttled = false;
        let mut packet = SwitchPacket::new(0, 1, &GEOM);
        for _ in 0..4 {
            packet.push_flit(&flit_payload(1));
        }
        port.outputqueue.push_back(packet);

        port.write_flits_to_output(&GEOM, 0, LINK, Throttle { numer: 1, denom: 2 }, None);
        let out = port.backend.output();
        let valid: Vec<usize> = (0..LINK as usize).filter(|&s| GEOM.is_valid(out, s)).collect();
        assert_eq!(valid, vec![0, 1, 2, 3]);
    }

    #[test]
    fn packet_splits_across_epochs_with_amt_read() {
        let mut port = port_with_input(|_| {});
        port.throttled = false;
        // due at slot 68 of a 70-slot epoch, 5 flits long
        let mut packet = SwitchPacket::new(68, 1, &GEOM);
        for tag in 0..5 {
            packet.push_flit(&flit_payload(tag));
        }
        port.outputqueue.push_back(packet);

        port.write_flits_to_output(&GEOM, 0, LINK, Throttle::line_rate(), None);
        {
            let out = port.backend.output();
            assert!(GEOM.is_valid(out, 68) && GEOM.is_valid(out, 69));
            assert!(!GEOM.is_last(out, 69));
        }
        assert_eq!(port.outputqueue.len(), 1);
        assert_eq!(port.outputqueue[0].amt_read, 2);

        // next epoch: remaining three flits placed immediately
        port.setup_send_buf(&GEOM);
        port.write_flits_to_output(&GEOM, LINK, LINK, Throttle::line_rate(), None);
        let out = port.backend.output();
        assert!(GEOM.is_valid(out, 0) && GEOM.is_valid(out, 1) && GEOM.is_valid(out, 2));
        assert!(GEOM.is_last(out, 2));
        assert_eq!(GEOM.flit(out, 0), &flit_payload(2));
        assert!(port.outputqueue.is_empty());
    }

    #[test]
    fn future_packets_wait_for_their_epoch() {
        let mut port = port_with_input(|_| {});
        let mut packet = SwitchPacket::new(LINK + 5, 1, &GEOM);
        packet.push_flit(&flit_payload(1));
        port.outputqueue.push_back(packet);

        port.write_flits_to_output(&GEOM, 0, LINK, Throttle::line_rate(), None);
        let out = port.backend.output();
        assert!((0..LINK as usize).all(|s| !GEOM.is_valid(out, s)));
        assert_eq!(port.outputqueue.len(), 1);
    }

    #[test]
    fn overflowing_packet_is_dropped_under_the_cap() {
        let mut port = port_with_input(|_| {});
        port.throttled = false;
        // waited 30 epochs in queue; cap of 100 flits says it overflowed
        let mut stale = SwitchPacket::new(5, 1, &GEOM);
        stale.push_flit(&flit_payload(1));
        let mut fresh = SwitchPacket::new(30 * LINK + 1, 1, &GEOM);
        fresh.push_flit(&flit_payload(2));
        port.outputqueue.push_back(stale);
        port.outputqueue.push_back(fresh);

        port.write_flits_to_output(&GEOM, 30 * LINK, LINK, Throttle::line_rate(), Some(100));
        let out = port.backend.output();
        assert!(!GEOM.is_valid(out, 0));
        assert!(GEOM.is_valid(out, 1));
        assert_eq!(GEOM.flit(out, 1), &flit_payload(2));
        assert!(port.outputqueue.is_empty());
    }

}
