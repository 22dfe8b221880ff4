//! Shared-memory port backend.

use flitnet_shmem::{ring_name, Direction, TokenRing};

use crate::error::Result;
use crate::port::PortBackend;

/// Double-buffered shared-memory transport.
///
/// A downlink owns its regions (creates and zeroes them); an uplink attaches
/// to regions its parent switch created, retrying until they appear. Both
/// sides work the same two buffers per direction, alternating every epoch;
/// the inbound flag is cleared in `tick`, strictly before the *next* epoch's
/// send, which is what keeps the peer from overwriting a buffer still being
/// drained.
pub struct ShmemBackend {
    recv_rings: [TokenRing; 2],
    send_rings: [TokenRing; 2],
    round: usize,
}

impl ShmemBackend {
    /// Downlink toward a NIC endpoint (or child switch): create the regions.
    /// Receives `nts`, sends `stn`.
    ///
    /// # Errors
    ///
    /// Returns an error if a region cannot be created or mapped.
    pub fn downlink(port_name: &str, epoch_bytes: usize) -> Result<Self> {
        tracing::info!("shmem downlink port {port_name}");
        Ok(Self {
            recv_rings: [
                TokenRing::create(&ring_name(Direction::NicToSwitch, port_name, 0), epoch_bytes)?,
                TokenRing::create(&ring_name(Direction::NicToSwitch, port_name, 1), epoch_bytes)?,
            ],
            send_rings: [
                TokenRing::create(&ring_name(Direction::SwitchToNic, port_name, 0), epoch_bytes)?,
                TokenRing::create(&ring_name(Direction::SwitchToNic, port_name, 1), epoch_bytes)?,
            ],
            round: 0,
        })
    }

    /// Uplink toward a parent switch: attach to its regions, waiting for it
    /// to create them. The direction roles flip: this side receives `stn`
    /// and sends `nts`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing region cannot be mapped.
    pub fn uplink(port_name: &str, epoch_bytes: usize) -> Result<Self> {
        tracing::info!("shmem uplink port {port_name}");
        Ok(Self {
            recv_rings: [
                TokenRing::attach(&ring_name(Direction::SwitchToNic, port_name, 0), epoch_bytes)?,
                TokenRing::attach(&ring_name(Direction::SwitchToNic, port_name, 1), epoch_bytes)?,
            ],
            send_rings: [
                TokenRing::attach(&ring_name(Direction::NicToSwitch, port_name, 0), epoch_bytes)?,
                TokenRing::attach(&ring_name(Direction::NicToSwitch, port_name, 1), epoch_bytes)?,
            ],
            round: 0,
        })
    }
}

impl PortBackend for ShmemBackend {
    fn input(&self) -> &[u8] {
        self.recv_rings[self.round].data()
    }

    fn output(&self) -> &[u8] {
        self.send_rings[self.round].data()
    }

    fn output_mut(&mut self) -> &mut [u8] {
        let round = self.round;
        self.send_rings[round].data_mut()
    }

    fn recv(&mut self) -> Result<()> {
        self.recv_rings[self.round].wait(1);
        Ok(())
    }

    fn send(&mut self) -> Result<()> {
        self.send_rings[self.round].post();
        Ok(())
    }

    fn tick(&mut self) {
        // hand the drained inbound buffer back, then swap pairs
        self.recv_rings[self.round].clear();
        self.round = (self.round + 1) % 2;
    }
}
