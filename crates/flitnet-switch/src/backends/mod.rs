//! Port backend implementations.
//!
//! Three transports move epochs between a port and its peer:
//! - **Shmem**: the peer shares this host (a NIC endpoint's simulator
//!   process, or another switch); epochs move through mmap'd rings.
//! - **Socket**: the peer is another switch across TCP.
//! - **Ssh**: the peer is a NIC endpoint on a remote host, reached through a
//!   locally forwarded socket.

pub mod shmem;
pub mod socket;
pub mod ssh;

pub use shmem::ShmemBackend;
pub use socket::SocketBackend;
pub use ssh::SshBackend;
