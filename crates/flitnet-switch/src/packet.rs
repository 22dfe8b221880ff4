//! In-flight packets between ingress decode and egress encode.

use flitnet_wire::token::{ETH_EXTRA_FLITS, ETH_MAX_BYTES};
use flitnet_wire::TokenGeometry;

/// A packet being assembled from, or emitted as, a run of flits.
///
/// A packet is owned by exactly one queue at a time: the ingress port's
/// input queue, the global reorder heap, or the destination port's output
/// queue. Hand-offs are moves; only broadcast fan-out clones, and
/// [`Clone`] is a deep copy including the payload.
#[derive(Debug, Clone)]
pub struct SwitchPacket {
    /// Simulated cycle at which the packet's first flit arrived, plus the
    /// switching latency. Egress may not place the first flit earlier.
    pub timestamp: u64,
    /// Ingress port index; broadcast never echoes to the sender.
    pub sender: usize,
    /// Flits already emitted, for packets spanning epochs.
    pub amt_read: usize,
    payload: Vec<u8>,
    flit_bytes: usize,
}

impl SwitchPacket {
    /// Start an empty packet. Capacity covers a maximum-size Ethernet frame
    /// plus padding, so assembly never reallocates.
    #[must_use]
    pub fn new(timestamp: u64, sender: usize, geom: &TokenGeometry) -> Self {
        let flit_bytes = geom.flit_bytes();
        let max_words = ETH_MAX_BYTES.div_ceil(flit_bytes);
        Self {
            timestamp,
            sender,
            amt_read: 0,
            payload: Vec::with_capacity(flit_bytes * (max_words + ETH_EXTRA_FLITS)),
            flit_bytes,
        }
    }

    /// Append one flit of payload.
    pub fn push_flit(&mut self, flit: &[u8]) {
        self.payload.extend_from_slice(&flit[..self.flit_bytes]);
    }

    /// Flits assembled so far.
    pub fn flits_written(&self) -> usize {
        self.payload.len() / self.flit_bytes
    }

    /// Borrow flit `index` of the payload.
    ///
    /// # Panics
    ///
    /// Panics if `index` has not been written.
    pub fn flit(&self, index: usize) -> &[u8] {
        let off = index * self.flit_bytes;
        &self.payload[off..off + self.flit_bytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_and_reads_back_flits() {
        let geom = TokenGeometry::default();
        let mut pkt = SwitchPacket::new(42, 1, &geom);
        pkt.push_flit(&[1u8; 8]);
        pkt.push_flit(&[2u8; 8]);
        assert_eq!(pkt.flits_written(), 2);
        assert_eq!(pkt.flit(0), &[1u8; 8]);
        assert_eq!(pkt.flit(1), &[2u8; 8]);
    }

    #[test]
    fn capacity_holds_a_full_frame_without_reallocating() {
        let geom = TokenGeometry::default();
        let mut pkt = SwitchPacket::new(0, 0, &geom);
        let base = pkt.payload.capacity();
        // 1518-byte MTU → 190 flits, plus 10 spare
        assert_eq!(base, (190 + 10) * 8);
        for _ in 0..200 {
            pkt.push_flit(&[0u8; 8]);
        }
        assert_eq!(pkt.payload.capacity(), base);
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let geom = TokenGeometry::default();
        let mut pkt = SwitchPacket::new(7, 0, &geom);
        pkt.push_flit(&[9u8; 8]);
        let mut copy = pkt.clone();
        copy.push_flit(&[3u8; 8]);
        assert_eq!(pkt.flits_written(), 1);
        assert_eq!(copy.flits_written(), 2);
        assert_eq!(copy.timestamp, 7);
    }
}
