//! Synchronous CDC transport backed by embassy-sync pipes
//!
//! The relay polls a `CdcFifo` through [`CdcPort`] while the async USB pumps
//! in `cdc_io` move whole packets between the FIFO and the endpoints.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;

use super::traits::CdcPort;

/// Byte FIFOs for one CDC-ACM interface
pub struct CdcFifo<const N: usize> {
    /// Host to device
    pub(crate) from_host: Pipe<CriticalSectionRawMutex, N>,
    /// Device to host
    pub(crate) to_host: Pipe<CriticalSectionRawMutex, N>,
    /// Raised by `write_flush`, consumed by the transmit pump
    pub(crate) flush_requested: Signal<CriticalSectionRawMutex, ()>,
    connected: AtomicBool,
}

impl<const N: usize> CdcFifo<N> {
    pub const fn new() -> Self {
        Self {
            from_host: Pipe::new(),
            to_host: Pipe::new(),
            flush_requested: Signal::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// Record whether the host has the interface open.
    ///
    /// Called by the USB task; the relay only reads it.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Bytes queued for the host
    pub fn pending_to_host(&self) -> usize {
        self.to_host.len()
    }
}

impl<const N: usize> Default for CdcFifo<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CdcPort for &CdcFifo<N> {
    fn connected(&self) -> bool {
        self.is_connected()
    }

    fn write_available(&self) -> usize {
        self.to_host.free_capacity()
    }

    fn available(&self) -> usize {
        self.from_host.len()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        self.to_host.try_write(data).unwrap_or(0)
    }

    fn write_flush(&mut self) {
        self.flush_requested.signal(());
    }

    fn write_clear(&mut self) {
        self.to_host.clear();
        self.flush_requested.reset();
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        self.from_host.try_read(buf).unwrap_or(0)
    }

    fn read_flush(&mut self) {
        self.from_host.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_limited_by_free_capacity() {
        let fifo: CdcFifo<8> = CdcFifo::new();
        let mut port = &fifo;

        assert_eq!(port.write_available(), 8);
        assert_eq!(port.write(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(port.write_available(), 3);
        assert_eq!(port.write(&[6, 7, 8, 9, 10]), 3);
        assert_eq!(port.write_available(), 0);
        assert_eq!(port.write(&[11]), 0);
    }

    #[test]
    fn test_read_returns_host_bytes() {
        let fifo: CdcFifo<16> = CdcFifo::new();
        fifo.from_host.try_write(&[0x41, 0x42, 0x43]).unwrap();
        let mut port = &fifo;

        assert_eq!(port.available(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf), 2);
        assert_eq!(&buf, &[0x41, 0x42]);
        assert_eq!(port.available(), 1);
    }

    #[test]
    fn test_read_empty_returns_zero() {
        let fifo: CdcFifo<16> = CdcFifo::new();
        let mut port = &fifo;

        let mut buf = [0u8; 4];
        assert_eq!(port.read(&mut buf), 0);
    }

    #[test]
    fn test_flush_and_clear() {
        let fifo: CdcFifo<16> = CdcFifo::new();
        let mut port = &fifo;

        port.write(&[1, 2, 3]);
        port.write_flush();
        assert!(fifo.flush_requested.signaled());

        port.write_clear();
        assert_eq!(fifo.pending_to_host(), 0);
        assert!(!fifo.flush_requested.signaled());
    }

    #[test]
    fn test_read_flush_discards_input() {
        let fifo: CdcFifo<16> = CdcFifo::new();
        fifo.from_host.try_write(&[1, 2, 3]).unwrap();
        let mut port = &fifo;

        port.read_flush();
        assert_eq!(port.available(), 0);
    }

    #[test]
    fn test_connected_flag() {
        let fifo: CdcFifo<16> = CdcFifo::new();
        assert!(!(&fifo).connected());

        fifo.set_connected(true);
        assert!((&fifo).connected());
    }
}
