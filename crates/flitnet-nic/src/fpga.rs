//! Collaborator traits for the FPGA platform layer.
//!
//! The driver never touches the FPGA directly; the simulation platform
//! (PCIe shell, XDMA, or a software bridge) supplies these two capabilities.
//! Register offsets come from [`flitnet_wire::regs`].

use crate::error::Result;

/// Memory-mapped access to the NIC widget's registers.
pub trait NicMmio {
    /// Read a 32-bit widget register.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform MMIO access fails.
    fn read(&mut self, reg: usize) -> Result<u32>;

    /// Write a 32-bit widget register.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform MMIO access fails.
    fn write(&mut self, reg: usize, value: u32) -> Result<()>;
}

/// Bulk token DMA between host memory and the widget's stream queues.
///
/// Both operations report the bytes actually moved; the driver treats any
/// short transfer as fatal.
pub trait FpgaDma {
    /// Push `src` to the widget's inbound token queue at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform DMA layer fails outright.
    fn push(&mut self, addr: u64, src: &[u8]) -> Result<usize>;

    /// Pull `dst.len()` bytes from the widget's outbound token queue at
    /// `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform DMA layer fails outright.
    fn pull(&mut self, addr: u64, dst: &mut [u8]) -> Result<usize>;
}
