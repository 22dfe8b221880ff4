//! TCP port backend for switch-to-switch links.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use crate::error::{Result, SwitchError};
use crate::port::PortBackend;

/// Blocking TCP transport moving exactly one epoch per `recv`/`send`.
///
/// The downlink side listens and accepts its one peer at startup; the uplink
/// side connects, retrying until the parent switch is up. There is no
/// framing beyond the fixed epoch size; a short stream is a broken link and
/// fatal.
pub struct SocketBackend {
    stream: TcpStream,
    port: usize,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>,
}

impl SocketBackend {
    /// Downlink: accept the single peer of switch port `port` on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the accepted
    /// stream cannot be configured.
    pub fn listen(addr: &str, port: usize, epoch_bytes: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| SwitchError::transport(port, e))?;
        tracing::info!("socket port {port}: listening on {addr}");
        let (stream, peer) = listener
            .accept()
            .map_err(|e| SwitchError::transport(port, e))?;
        tracing::info!("socket port {port}: peer {peer} connected");
        Self::from_stream(stream, port, epoch_bytes)
    }

    /// Uplink: connect to the parent switch at `addr`, retrying once per
    /// second until it answers.
    ///
    /// # Errors
    ///
    /// Returns an error if an established stream cannot be configured.
    pub fn connect(addr: &str, port: usize, epoch_bytes: usize) -> Result<Self> {
        let stream = loop {
            match TcpStream::connect(addr) {
                Ok(stream) => break stream,
                Err(e) => {
                    tracing::warn!("socket port {port}: connect {addr} failed ({e}), retrying in 1s...");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        };
        tracing::info!("socket port {port}: connected to {addr}");
        Self::from_stream(stream, port, epoch_bytes)
    }

    pub(crate) fn from_stream(stream: TcpStream, port: usize, epoch_bytes: usize) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| SwitchError::transport(port, e))?;
        Ok(Self {
            stream,
            port,
            inbuf: vec![0; epoch_bytes],
            outbuf: vec![0; epoch_bytes],
        })
    }
}

impl PortBackend for SocketBackend {
    fn input(&self) -> &[u8] {
        &self.inbuf
    }

    fn output(&self) -> &[u8] {
        &self.outbuf
    }

    fn output_mut(&mut self) -> &mut [u8] {
        &mut self.outbuf
    }

    fn recv(&mut self) -> Result<()> {
        self.stream
            .read_exact(&mut self.inbuf)
            .map_err(|e| SwitchError::transport(self.port, e))
    }

    fn send(&mut self) -> Result<()> {
        self.stream
            .write_all(&self.outbuf)
            .map_err(|e| SwitchError::transport(self.port, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn moves_whole_epochs_both_ways() {
        const EPOCH: usize = 128;
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut epoch = vec![0u8; EPOCH];
            stream.read_exact(&mut epoch).unwrap();
            // echo it back
            stream.write_all(&epoch).unwrap();
            epoch
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut backend = SocketBackend::from_stream(stream, 0, EPOCH).unwrap();
        backend.output_mut().copy_from_slice(&[0x5A; EPOCH]);
        backend.send().unwrap();
        backend.recv().unwrap();

        assert_eq!(backend.input(), &[0x5A; EPOCH][..]);
        assert_eq!(peer.join().unwrap(), vec![0x5A; EPOCH]);
    }

    #[test]
    fn a_closed_peer_is_a_transport_error() {
        const EPOCH: usize = 64;
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream); // hang up immediately
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut backend = SocketBackend::from_stream(stream, 3, EPOCH).unwrap();
        peer.join().unwrap();

        let err = backend.recv().unwrap_err();
        assert!(matches!(err, SwitchError::Transport { port: 3, .. }));
    }
}
