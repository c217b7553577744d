//! One UART bound to one CDC interface
//!
//! Each pass is bounded by the relay buffers: at most `BUFFER_SIZE` bytes
//! leave the UART and at most `USB_TO_UART_CHUNK` bytes enter it.

use heapless::Vec;

use crate::config::relay::{BUFFER_SIZE, USB_TO_UART_CHUNK};
use crate::uart::{UartPins, UartPort};
use crate::usb::CdcPort;

/// Static settings for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub pins: UartPins,
    /// Rate used by `init` before the host sets a line coding
    pub baud_rate: u32,
}

/// Byte counts for one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Taken off the UART
    pub drained: usize,
    /// Written and flushed to the host
    pub to_host: usize,
    /// Drained but not delivered (no host, or no room)
    pub dropped: usize,
    /// Read from the host and written to the UART
    pub to_uart: usize,
}

impl RelayStats {
    pub fn is_idle(&self) -> bool {
        self.drained == 0 && self.to_uart == 0
    }
}

/// Running totals since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCounters {
    pub uart_rx: u32,
    pub usb_tx: u32,
    pub dropped: u32,
    pub usb_rx: u32,
}

impl RelayCounters {
    fn record(&mut self, stats: &RelayStats) {
        self.uart_rx = self.uart_rx.saturating_add(stats.drained as u32);
        self.usb_tx = self.usb_tx.saturating_add(stats.to_host as u32);
        self.dropped = self.dropped.saturating_add(stats.dropped as u32);
        self.usb_rx = self.usb_rx.saturating_add(stats.to_uart as u32);
    }
}

/// Relay state for one UART/CDC pair
pub struct RelayChannel<U, C> {
    index: u8,
    uart: U,
    cdc: C,
    config: ChannelConfig,
    /// UART to host
    inbound: Vec<u8, BUFFER_SIZE>,
    /// Host to UART
    outbound: [u8; BUFFER_SIZE],
    counters: RelayCounters,
}

impl<U: UartPort, C: CdcPort> RelayChannel<U, C> {
    pub fn new(index: u8, uart: U, cdc: C, config: ChannelConfig) -> Self {
        Self {
            index,
            uart,
            cdc,
            config,
            inbound: Vec::new(),
            outbound: [0; BUFFER_SIZE],
            counters: RelayCounters::default(),
        }
    }

    /// Route the pins and start the UART at the default rate.
    pub fn init(&mut self) {
        self.uart.configure_pins(&self.config.pins);
        self.uart.init(self.config.baud_rate);
        log::debug!(
            "CH{}: UART up at {} baud (tx={} rx={})",
            self.index,
            self.config.baud_rate,
            self.config.pins.tx,
            self.config.pins.rx
        );
    }

    /// Move whatever the UART has received into the inbound buffer.
    ///
    /// Stops when the UART is empty or the buffer is full; anything left in
    /// the UART waits for the next pass. Returns the number of bytes taken.
    pub fn drain_uart(&mut self) -> usize {
        self.inbound.clear();
        while !self.inbound.is_full() && self.uart.is_readable() {
            // Cannot fail: capacity checked above
            let _ = self.inbound.push(self.uart.read_byte());
        }
        self.inbound.len()
    }

    /// Send the drained bytes to the host.
    ///
    /// Writes as much as the transport has room for right now and flushes.
    /// Without a host, or beyond the available room, bytes are discarded.
    /// Returns `(forwarded, dropped)`.
    pub fn forward_to_host(&mut self, connected: bool) -> (usize, usize) {
        let drained = self.inbound.len();
        if drained == 0 {
            return (0, 0);
        }
        if !connected {
            self.inbound.clear();
            return (0, drained);
        }

        let room = core::cmp::min(self.cdc.write_available(), drained);
        let mut written = 0;
        if room > 0 {
            written = self.cdc.write(&self.inbound[..room]);
            self.cdc.write_flush();
        }
        self.inbound.clear();

        let dropped = drained - written;
        if dropped > 0 {
            log::warn!("CH{}: host FIFO full, dropped {} bytes", self.index, dropped);
        }
        (written, dropped)
    }

    /// Copy one bounded chunk from the host to the UART.
    ///
    /// The blocking UART write is the only wait in a pass; the chunk cap keeps
    /// it short. Returns the number of bytes written to the UART.
    pub fn forward_to_uart(&mut self) -> usize {
        let watermark = core::cmp::min(self.cdc.available(), self.outbound.len());
        let watermark = core::cmp::min(watermark, USB_TO_UART_CHUNK);
        if watermark == 0 {
            return 0;
        }

        let count = self.cdc.read(&mut self.outbound[..watermark]);
        if count > 0 {
            self.uart.write_blocking(&self.outbound[..count]);
        }
        count
    }

    /// Run both directions for one pass.
    ///
    /// `drain_uart` must already have run for this pass.
    pub fn relay(&mut self, connected: bool) -> RelayStats {
        let drained = self.inbound.len();
        let (to_host, dropped) = self.forward_to_host(connected);
        let to_uart = if connected { self.forward_to_uart() } else { 0 };

        let stats = RelayStats {
            drained,
            to_host,
            dropped,
            to_uart,
        };
        self.counters.record(&stats);
        stats
    }

    /// Stop the UART ahead of a rate change.
    pub fn shutdown(&mut self) {
        self.uart.deinit();
        self.inbound.clear();
    }

    /// Restart the UART at a new rate.
    pub fn reinit(&mut self, baud_rate: u32) {
        self.uart.init(baud_rate);
        log::debug!("CH{}: UART reconfigured to {} baud", self.index, baud_rate);
    }

    /// Drop output queued for the host but not yet sent.
    pub fn clear_host_output(&mut self) {
        self.cdc.write_clear();
    }

    /// Drop queued output and unread input on the CDC transport.
    pub fn purge_transport(&mut self) {
        self.cdc.write_clear();
        self.cdc.read_flush();
    }

    pub fn connected(&self) -> bool {
        self.cdc.connected()
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn counters(&self) -> RelayCounters {
        self.counters
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn cdc(&self) -> &C {
        &self.cdc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::traits::mock::MockUart;
    use crate::usb::traits::mock::MockCdc;

    const TEST_CONFIG: ChannelConfig = ChannelConfig {
        pins: UartPins {
            tx: 4,
            rx: 5,
            pull_up: true,
        },
        baud_rate: 115200,
    };

    fn channel() -> RelayChannel<MockUart, MockCdc> {
        RelayChannel::new(0, MockUart::new(), MockCdc::new(), TEST_CONFIG)
    }

    #[test]
    fn test_init_configures_pins_and_rate() {
        let mut ch = channel();
        ch.init();

        assert_eq!(ch.uart().pins(), Some(TEST_CONFIG.pins));
        assert_eq!(ch.uart().baud_rate(), Some(115200));
    }

    #[test]
    fn test_drain_stops_at_buffer_capacity() {
        let mut ch = channel();
        ch.uart().queue_rx_data(&[0x55; BUFFER_SIZE + 10]);

        assert_eq!(ch.drain_uart(), BUFFER_SIZE);
        assert_eq!(ch.uart().rx_pending(), 10);

        // Remainder is picked up next pass
        assert_eq!(ch.drain_uart(), 10);
        assert_eq!(ch.uart().rx_pending(), 0);
    }

    #[test]
    fn test_forward_to_host_in_order() {
        let mut ch = channel();
        ch.uart().queue_rx_data(b"0123456789");

        ch.drain_uart();
        assert_eq!(ch.forward_to_host(true), (10, 0));
        assert_eq!(ch.cdc().get_delivered().as_slice(), b"0123456789");
        assert_eq!(ch.cdc().flush_count(), 1);
    }

    #[test]
    fn test_forward_to_host_drops_excess() {
        let mut ch = channel();
        ch.cdc().set_tx_capacity(10);
        let data: [u8; 20] = core::array::from_fn(|i| i as u8);
        ch.uart().queue_rx_data(&data);

        ch.drain_uart();
        assert_eq!(ch.forward_to_host(true), (10, 10));
        assert_eq!(ch.cdc().get_delivered().as_slice(), &data[..10]);

        // Dropped bytes are not retried
        ch.drain_uart();
        assert_eq!(ch.forward_to_host(true), (0, 0));
        assert_eq!(ch.cdc().get_delivered().len(), 10);
        assert_eq!(ch.uart().rx_pending(), 0);
    }

    #[test]
    fn test_forward_to_host_without_room_skips_flush() {
        let mut ch = channel();
        ch.cdc().set_tx_capacity(0);
        ch.uart().queue_rx_data(&[1, 2, 3]);

        ch.drain_uart();
        assert_eq!(ch.forward_to_host(true), (0, 3));
        assert_eq!(ch.cdc().flush_count(), 0);
    }

    #[test]
    fn test_forward_to_host_disconnected_discards() {
        let mut ch = channel();
        ch.uart().queue_rx_data(&[1, 2, 3]);

        ch.drain_uart();
        assert_eq!(ch.forward_to_host(false), (0, 3));
        assert!(ch.cdc().get_delivered().is_empty());
        assert!(ch.cdc().get_pending_tx().is_empty());
        assert_eq!(ch.uart().rx_pending(), 0);
    }

    #[test]
    fn test_forward_to_uart_chunk_cap() {
        let mut ch = channel();
        let data: [u8; 30] = core::array::from_fn(|i| i as u8);
        ch.cdc().queue_rx_data(&data);

        assert_eq!(ch.forward_to_uart(), USB_TO_UART_CHUNK);
        assert_eq!(ch.uart().get_tx_data().as_slice(), &data[..16]);
        assert_eq!(ch.cdc().get_read_requests().as_slice(), &[16]);

        assert_eq!(ch.forward_to_uart(), 14);
        assert_eq!(ch.uart().get_tx_data().as_slice(), &data[..]);
        assert_eq!(ch.uart().get_tx_writes().as_slice(), &[16, 14]);
    }

    #[test]
    fn test_forward_to_uart_nothing_available() {
        let mut ch = channel();

        assert_eq!(ch.forward_to_uart(), 0);
        assert!(ch.cdc().get_read_requests().is_empty());
        assert!(ch.uart().get_tx_writes().is_empty());
    }

    #[test]
    fn test_relay_disconnected_skips_host_input() {
        let mut ch = channel();
        ch.cdc().queue_rx_data(&[7; 8]);
        ch.uart().queue_rx_data(&[1; 4]);

        ch.drain_uart();
        let stats = ch.relay(false);

        assert_eq!(
            stats,
            RelayStats {
                drained: 4,
                to_host: 0,
                dropped: 4,
                to_uart: 0,
            }
        );
        assert_eq!(ch.cdc().available(), 8);
        assert!(ch.uart().get_tx_data().is_empty());
    }

    #[test]
    fn test_counters_accumulate() {
        let mut ch = channel();
        ch.cdc().set_tx_capacity(2);

        ch.uart().queue_rx_data(&[1, 2, 3]);
        ch.cdc().queue_rx_data(&[9]);
        ch.drain_uart();
        ch.relay(true);

        ch.uart().queue_rx_data(&[4]);
        ch.drain_uart();
        ch.relay(true);

        assert_eq!(
            ch.counters(),
            RelayCounters {
                uart_rx: 4,
                usb_tx: 3,
                dropped: 1,
                usb_rx: 1,
            }
        );
    }

    #[test]
    fn test_shutdown_and_reinit() {
        let mut ch = channel();
        ch.init();

        ch.shutdown();
        assert_eq!(ch.uart().baud_rate(), None);

        ch.reinit(9600);
        assert_eq!(ch.uart().baud_rate(), Some(9600));
    }
}
