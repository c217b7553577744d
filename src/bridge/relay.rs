//! Dual-channel relay driven by an external run loop

use crate::config::relay::{CHANNEL_COUNT, PRIMARY_CHANNEL};
use crate::uart::UartPort;
use crate::usb::CdcPort;

use super::channel::{RelayChannel, RelayCounters, RelayStats};
use super::events::{turnaround_micros, BridgeEvents, LineCoding, LineState};

/// Host presence as of the previous pass
///
/// Owned by the run loop: passed into `Bridge::poll` and returned updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Outcome of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// State to pass into the next poll
    pub link: ConnectionState,
    pub channels: [RelayStats; CHANNEL_COUNT],
}

/// Both relay channels plus the derived poll cadence
pub struct Bridge<U, C> {
    channels: [RelayChannel<U, C>; CHANNEL_COUNT],
    poll_interval_us: u32,
    line_states: [LineState; CHANNEL_COUNT],
    /// Counters as of the last `report_counters`
    reported: [RelayCounters; CHANNEL_COUNT],
}

impl<U: UartPort, C: CdcPort> Bridge<U, C> {
    /// Create a bridge over two channels.
    ///
    /// `default_baud` sets the initial poll interval until the host picks a rate.
    pub fn new(channels: [RelayChannel<U, C>; CHANNEL_COUNT], default_baud: u32) -> Self {
        Self {
            channels,
            poll_interval_us: turnaround_micros(default_baud),
            line_states: [LineState::default(); CHANNEL_COUNT],
            reported: [RelayCounters::default(); CHANNEL_COUNT],
        }
    }

    /// Bring both UARTs up. Must run once before the first poll.
    pub fn init(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.init();
        }
    }

    /// One relay pass over both channels.
    ///
    /// UARTs are always drained so their FIFOs do not overflow; what was
    /// drained only reaches the host while it is connected. When the host
    /// goes away, output still queued for it is cleared so a later
    /// connection does not receive stale data.
    pub fn poll(&mut self, link: ConnectionState) -> PollReport {
        for channel in self.channels.iter_mut() {
            channel.drain_uart();
        }

        let connected = self.channels[PRIMARY_CHANNEL].connected();
        let mut stats = [RelayStats::default(); CHANNEL_COUNT];
        for (channel, slot) in self.channels.iter_mut().zip(stats.iter_mut()) {
            *slot = channel.relay(connected);
            if !slot.is_idle() {
                log::trace!("CH{}: {:?}", channel.index(), slot);
            }
        }

        let link = match (connected, link) {
            (true, ConnectionState::Disconnected) => {
                log::info!("Host connected");
                ConnectionState::Connected
            }
            (true, ConnectionState::Connected) => ConnectionState::Connected,
            (false, ConnectionState::Connected) => {
                log::info!("Host disconnected, clearing queued output");
                for channel in self.channels.iter_mut() {
                    channel.clear_host_output();
                }
                ConnectionState::Disconnected
            }
            (false, ConnectionState::Disconnected) => ConnectionState::Disconnected,
        };

        PollReport {
            link,
            channels: stats,
        }
    }

    /// Apply a host line-coding change.
    ///
    /// Reprograms both UARTs to the requested rate whichever interface asked,
    /// and purges the primary transport. Returns the new poll interval in
    /// microseconds for the scheduler.
    pub fn on_line_coding(&mut self, interface: u8, coding: &LineCoding) -> u32 {
        self.poll_interval_us = turnaround_micros(coding.baud_rate);
        log::debug!(
            "CDC{}: line coding {} baud {}{:?}{:?}, poll every {}us",
            interface,
            coding.baud_rate,
            coding.data_bits,
            coding.parity,
            coding.stop_bits,
            self.poll_interval_us
        );

        for channel in self.channels.iter_mut() {
            channel.shutdown();
        }
        self.channels[PRIMARY_CHANNEL].purge_transport();
        for channel in self.channels.iter_mut() {
            channel.reinit(coding.baud_rate);
        }

        self.poll_interval_us
    }

    /// Record a host DTR/RTS change. Has no effect on the relay.
    pub fn on_line_state(&mut self, interface: u8, state: LineState) {
        log::debug!("CDC{}: dtr={} rts={}", interface, state.dtr, state.rts);
        if let Some(slot) = self.line_states.get_mut(interface as usize) {
            *slot = state;
        }
    }

    /// Apply pending host notifications, then poll.
    pub fn step(&mut self, events: &BridgeEvents, link: ConnectionState) -> PollReport {
        if let Some(change) = events.take_line_coding() {
            self.on_line_coding(change.interface, &change.coding);
        }
        while let Some(change) = events.take_line_state() {
            self.on_line_state(change.interface, change.state);
        }
        self.poll(link)
    }

    /// Log the running totals of every channel that moved data since the
    /// last report. Returns true if anything was logged.
    pub fn report_counters(&mut self) -> bool {
        let mut logged = false;
        for (channel, reported) in self.channels.iter().zip(self.reported.iter_mut()) {
            let counters = channel.counters();
            if counters == *reported {
                continue;
            }
            log::info!(
                "CH{}: uart_rx={} usb_tx={} dropped={} usb_rx={}",
                channel.index(),
                counters.uart_rx,
                counters.usb_tx,
                counters.dropped,
                counters.usb_rx
            );
            *reported = counters;
            logged = true;
        }
        logged
    }

    /// Interval the scheduler should wait between polls
    pub fn poll_interval_us(&self) -> u32 {
        self.poll_interval_us
    }

    /// Last DTR/RTS reported for an interface
    pub fn line_state(&self, interface: u8) -> Option<LineState> {
        self.line_states.get(interface as usize).copied()
    }

    pub fn channel(&self, index: usize) -> &RelayChannel<U, C> {
        &self.channels[index]
    }
}
