//! One direction of a double-buffered shared-memory token link.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use rustix::fs::{ftruncate, Mode};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, ShmOFlags};

use crate::error::{Result, ShmemError};

/// Transfer direction a region carries, as encoded in its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// NIC to switch (`nts`).
    NicToSwitch,
    /// Switch to NIC (`stn`).
    SwitchToNic,
}

impl Direction {
    const fn tag(self) -> &'static str {
        match self {
            Self::NicToSwitch => "nts",
            Self::SwitchToNic => "stn",
        }
    }
}

/// Region name for one direction and one half of a double buffer:
/// `/port_<dir><name>_<j>`.
#[must_use]
pub fn ring_name(direction: Direction, port_name: &str, j: usize) -> String {
    format!("/port_{}{}_{}", direction.tag(), port_name, j)
}

/// One mapped token-stream buffer: an epoch of big-tokens plus the trailing
/// handshake byte.
///
/// The payload region is plain memory owned by whichever side the flag says;
/// the flag byte is accessed with acquire/release atomics so a flag
/// transition publishes the payload written before it.
pub struct TokenRing {
    ptr: NonNull<u8>,
    payload_len: usize,
    name: String,
}

// SAFETY: TokenRing hands the mapping to at most one owner per process; the
// mapping itself is process-wide and survives moves between threads.
unsafe impl Send for TokenRing {}

// SAFETY: payload writes require &mut self; the flag byte is only touched
// through AtomicU8 operations.
unsafe impl Sync for TokenRing {}

impl std::fmt::Debug for TokenRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRing")
            .field("name", &self.name)
            .field("payload_len", &self.payload_len)
            .field("flag", &self.flag())
            .finish()
    }
}

impl TokenRing {
    /// Open or create a region without truncating it (the NIC endpoint
    /// side: either peer may arrive first, and an existing region's content
    /// must survive).
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be opened, sized, or mapped.
    pub fn open(name: &str, payload_len: usize) -> Result<Self> {
        tracing::info!("opening shmem region {name}");
        let fd = shm_open(name, ShmOFlags::RDWR | ShmOFlags::CREATE, Mode::RWXU).map_err(
            |source| ShmemError::Open {
                name: name.to_string(),
                source,
            },
        )?;
        ftruncate(&fd, (payload_len + 1) as u64).map_err(|source| ShmemError::Size {
            name: name.to_string(),
            bytes: payload_len + 1,
            source,
        })?;
        Self::map(&fd, name, payload_len)
    }

    /// Create a region, truncating and zeroing any previous incarnation (the
    /// switch downlink side, which owns region lifecycle).
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be created, sized, or mapped.
    pub fn create(name: &str, payload_len: usize) -> Result<Self> {
        tracing::info!("creating shmem region {name}");
        let fd = shm_open(
            name,
            ShmOFlags::RDWR | ShmOFlags::CREATE | ShmOFlags::TRUNC,
            Mode::RWXU,
        )
        .map_err(|source| ShmemError::Open {
            name: name.to_string(),
            source,
        })?;
        ftruncate(&fd, (payload_len + 1) as u64).map_err(|source| ShmemError::Size {
            name: name.to_string(),
            bytes: payload_len + 1,
            source,
        })?;
        let mut ring = Self::map(&fd, name, payload_len)?;
        ring.data_mut().fill(0);
        ring.flag_atomic().store(0, Ordering::Release);
        Ok(ring)
    }

    /// Attach to a region another process creates (the switch uplink side),
    /// retrying once per second until it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing region cannot be mapped.
    pub fn attach(name: &str, payload_len: usize) -> Result<Self> {
        tracing::info!("attaching to shmem region {name}");
        let fd = loop {
            match shm_open(name, ShmOFlags::RDWR, Mode::RWXU) {
                Ok(fd) => break fd,
                Err(errno) => {
                    tracing::warn!("shm_open {name} failed ({errno}), retrying in 1s...");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        };
        Self::map(&fd, name, payload_len)
    }

    /// Remove a region name (startup hygiene and tests; running links never
    /// unlink).
    ///
    /// # Errors
    ///
    /// Returns an error if the name exists but cannot be removed.
    pub fn unlink(name: &str) -> Result<()> {
        shm_unlink(name).map_err(|source| ShmemError::Open {
            name: name.to_string(),
            source,
        })
    }

    fn map(fd: &impl rustix::fd::AsFd, name: &str, payload_len: usize) -> Result<Self> {
        let len = payload_len + 1;
        // SAFETY: fd was just opened and sized to len; the kernel zero-fills
        // newly extended pages. The mapping is unmapped in Drop with the same
        // length, and all access goes through the bounds-fixed accessors
        // below.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
            .map_err(|source| ShmemError::Map {
                name: name.to_string(),
                source,
            })?
        };
        let ptr = NonNull::new(ptr.cast::<u8>()).expect("mmap returns non-null on success");
        tracing::debug!("mapped {name}: {len} bytes at {ptr:p}");
        Ok(Self {
            ptr,
            payload_len,
            name: name.to_string(),
        })
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload length in bytes (one epoch of big-tokens).
    pub const fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Borrow the payload.
    pub fn data(&self) -> &[u8] {
        // SAFETY: ptr maps payload_len + 1 readable bytes for self's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.payload_len) }
    }

    /// Borrow the payload mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr maps payload_len + 1 writable bytes; &mut self gives
        // this process's side exclusive access, and the handshake flag keeps
        // the peer process off the buffer.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.payload_len) }
    }

    fn flag_atomic(&self) -> &AtomicU8 {
        // SAFETY: the byte at payload_len is inside the mapping, align 1,
        // and is only ever accessed atomically by both processes.
        unsafe { AtomicU8::from_ptr(self.ptr.as_ptr().add(self.payload_len)) }
    }

    /// Current handshake flag value.
    pub fn flag(&self) -> u8 {
        self.flag_atomic().load(Ordering::Acquire)
    }

    /// Producer release: publish the payload to the consumer (flag 0 → 1).
    pub fn post(&self) {
        self.flag_atomic().store(1, Ordering::Release);
    }

    /// Consumer release: hand the buffer back to the producer (flag 1 → 0).
    pub fn clear(&self) {
        self.flag_atomic().store(0, Ordering::Release);
    }

    /// Spin until the flag reads `target`. Burns the core; the fabric has no
    /// timeout, so a stalled peer manifests as an indefinite spin.
    pub fn wait(&self, target: u8) {
        while self.flag_atomic().load(Ordering::Acquire) != target {
            std::hint::spin_loop();
        }
    }
}

impl Drop for TokenRing {
    fn drop(&mut self) {
        // SAFETY: ptr/len are exactly what mmap returned in map(); Drop runs
        // at most once and no borrows of the mapping outlive self.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.payload_len + 1) {
                tracing::error!("munmap {} failed during drop: {e}", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_port_convention() {
        assert_eq!(ring_name(Direction::NicToSwitch, "slot0", 0), "/port_ntsslot0_0");
        assert_eq!(ring_name(Direction::SwitchToNic, "slot0", 1), "/port_stnslot0_1");
    }
}
