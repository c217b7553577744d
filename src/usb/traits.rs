//! CDC transport trait for abstraction and testability
//!
//! Models one CDC-ACM interface as a pair of byte FIFOs, the way the relay
//! sees it: non-blocking queries and transfers that report how much moved.

/// Abstract USB CDC byte-queue interface
pub trait CdcPort {
    /// Returns true while the host has the device configured
    fn connected(&self) -> bool;

    /// Free space in the transmit FIFO
    fn write_available(&self) -> usize;

    /// Bytes received from the host and not yet read
    fn available(&self) -> usize;

    /// Queue bytes for the host, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> usize;

    /// Hand queued bytes to the USB stack for transmission
    fn write_flush(&mut self);

    /// Discard queued bytes that have not been sent
    fn write_clear(&mut self);

    /// Read up to `buf.len()` received bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discard all received bytes not yet read
    fn read_flush(&mut self);
}
