//! Forwarded-socket backend for NIC endpoints on remote hosts.

use crate::backends::socket::SocketBackend;
use crate::error::Result;
use crate::port::PortBackend;

/// Epoch stream to a remote NIC endpoint through a locally forwarded TCP
/// port (e.g. `ssh -L`). On the wire this is the socket transport; the
/// remote end bridges the forwarded stream into the endpoint's rings.
pub struct SshBackend {
    inner: SocketBackend,
}

impl SshBackend {
    /// Connect to the forwarded local port, retrying until the tunnel is up.
    ///
    /// # Errors
    ///
    /// Returns an error if an established stream cannot be configured.
    pub fn forwarded(local_port: u16, port: usize, epoch_bytes: usize) -> Result<Self> {
        tracing::info!("ssh port {port}: using forwarded socket 127.0.0.1:{local_port}");
        let inner =
            SocketBackend::connect(&format!("127.0.0.1:{local_port}"), port, epoch_bytes)?;
        Ok(Self { inner })
    }
}

impl PortBackend for SshBackend {
    fn input(&self) -> &[u8] {
        self.inner.input()
    }

    fn output(&self) -> &[u8] {
        self.inner.output()
    }

    fn output_mut(&mut self) -> &mut [u8] {
        self.inner.output_mut()
    }

    fn recv(&mut self) -> Result<()> {
        self.inner.recv()
    }

    fn send(&mut self) -> Result<()> {
        self.inner.send()
    }
}
