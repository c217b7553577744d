//! Host notifications and their handoff to the poll loop
//!
//! USB callbacks run in the USB task, not in the relay. Instead of touching
//! the relay state directly they post here, and `Bridge::step` applies the
//! queued notifications before its next pass.

use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::timing::{BITS_PER_SYMBOL, FIFO_BATCH_SYMBOLS, MICROS_PER_SECOND};
use crate::config::usb::LINE_STATE_QUEUE_DEPTH;

/// Parity setting requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Stop bits requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Serial parameters from a CDC SET_LINE_CODING request.
///
/// Only the baud rate is applied to the UARTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCoding {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl LineCoding {
    /// 8N1 at the given rate
    pub const fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// DTR/RTS from a CDC SET_CONTROL_LINE_STATE request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineState {
    pub dtr: bool,
    pub rts: bool,
}

/// Line-coding change on one interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCodingChange {
    pub interface: u8,
    pub coding: LineCoding,
}

/// Line-state change on one interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStateChange {
    pub interface: u8,
    pub state: LineState,
}

/// Poll interval in microseconds for a baud rate: the time the UART takes to
/// receive a FIFO batch. A rate of zero is treated as one.
pub fn turnaround_micros(baud_rate: u32) -> u32 {
    (MICROS_PER_SECOND * FIFO_BATCH_SYMBOLS * BITS_PER_SYMBOL) / baud_rate.max(1)
}

/// Mailbox between the USB callbacks and the relay loop
///
/// Line-coding changes are latest-wins: both UARTs are reprogrammed to the
/// requested rate, so only the newest request matters. Line-state changes
/// are queued and dropped when the queue is full.
pub struct BridgeEvents {
    line_coding: Signal<CriticalSectionRawMutex, LineCodingChange>,
    line_state: Channel<CriticalSectionRawMutex, LineStateChange, LINE_STATE_QUEUE_DEPTH>,
}

impl BridgeEvents {
    pub const fn new() -> Self {
        Self {
            line_coding: Signal::new(),
            line_state: Channel::new(),
        }
    }

    /// Called from the USB side when the host sets a new line coding.
    pub fn notify_line_coding(&self, interface: u8, coding: LineCoding) {
        self.line_coding.signal(LineCodingChange { interface, coding });
    }

    /// Called from the USB side when the host changes DTR/RTS.
    ///
    /// Returns false if the notification was dropped.
    pub fn notify_line_state(&self, interface: u8, state: LineState) -> bool {
        match self.line_state.try_send(LineStateChange { interface, state }) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("CDC{}: line state queue full, dropped {:?}", interface, state);
                false
            }
        }
    }

    /// Wait for `tick` to finish or a line-coding change to arrive.
    ///
    /// Returns the change if it came first, so a reconfiguration never waits
    /// out a poll interval derived from the previous rate.
    pub async fn next_tick<F: Future>(&self, tick: F) -> Option<LineCodingChange> {
        match select(tick, self.line_coding.wait()).await {
            Either::First(_) => None,
            Either::Second(change) => Some(change),
        }
    }

    /// Take the pending line-coding change, if any.
    pub fn take_line_coding(&self) -> Option<LineCodingChange> {
        self.line_coding.try_take()
    }

    /// Take the oldest pending line-state change, if any.
    pub fn take_line_state(&self) -> Option<LineStateChange> {
        self.line_state.try_receive().ok()
    }
}

impl Default for BridgeEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifications derived from one "control changed" wake-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlUpdate {
    pub coding: Option<LineCoding>,
    pub state: Option<LineState>,
}

/// Turns CDC control wake-ups for one interface into bridge notifications.
///
/// The USB stack wakes the port task for both SET_LINE_CODING and
/// SET_CONTROL_LINE_STATE without saying which arrived. A wake-up that leaves
/// DTR/RTS unchanged is taken as SET_LINE_CODING and always posted, even at
/// an unchanged rate, because another interface may have moved both UARTs
/// since. A wake-up that changes DTR/RTS only posts the coding as well when
/// it differs from this interface's previous one.
#[derive(Debug, Clone, Copy)]
pub struct ControlTracker {
    interface: u8,
    coding: LineCoding,
    state: LineState,
}

impl ControlTracker {
    /// `coding` is what the interface reports before any host request.
    pub const fn new(interface: u8, coding: LineCoding) -> Self {
        Self {
            interface,
            coding,
            state: LineState { dtr: false, rts: false },
        }
    }

    /// Classify a wake-up given the interface's current settings.
    pub fn update(&mut self, coding: LineCoding, state: LineState) -> ControlUpdate {
        let state_changed = state != self.state;
        let coding_changed = coding != self.coding;
        self.coding = coding;
        self.state = state;

        ControlUpdate {
            coding: (coding_changed || !state_changed).then_some(coding),
            state: state_changed.then_some(state),
        }
    }

    /// Classify a wake-up and post the result to `events`.
    pub fn apply(&mut self, coding: LineCoding, state: LineState, events: &BridgeEvents) -> ControlUpdate {
        let update = self.update(coding, state);
        if let Some(coding) = update.coding {
            events.notify_line_coding(self.interface, coding);
        }
        if let Some(state) = update.state {
            events.notify_line_state(self.interface, state);
        }
        update
    }

    /// Forget the host's DTR/RTS, e.g. after the interface was deconfigured.
    pub fn reset_line_state(&mut self) {
        self.state = LineState::default();
    }
}

/// Mailbox used by the firmware's USB and bridge tasks
pub static BRIDGE_EVENTS: BridgeEvents = BridgeEvents::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turnaround_common_rates() {
        assert_eq!(turnaround_micros(115200), 1388);
        assert_eq!(turnaround_micros(9600), 16666);
        assert_eq!(turnaround_micros(1_000_000), 160);
    }

    #[test]
    fn test_turnaround_zero_baud_clamped() {
        assert_eq!(turnaround_micros(0), turnaround_micros(1));
        assert_eq!(turnaround_micros(0), 160_000_000);
    }

    #[test]
    fn test_line_coding_latest_wins() {
        let events = BridgeEvents::new();

        events.notify_line_coding(0, LineCoding::with_baud_rate(9600));
        events.notify_line_coding(1, LineCoding::with_baud_rate(57600));

        let change = events.take_line_coding().expect("Should have a change");
        assert_eq!(change.interface, 1);
        assert_eq!(change.coding.baud_rate, 57600);
        assert!(events.take_line_coding().is_none());
    }

    #[test]
    fn test_line_state_queue_bounded() {
        let events = BridgeEvents::new();
        let state = LineState { dtr: true, rts: false };

        for _ in 0..LINE_STATE_QUEUE_DEPTH {
            assert!(events.notify_line_state(0, state));
        }
        assert!(!events.notify_line_state(1, state));

        let mut taken = 0;
        while let Some(change) = events.take_line_state() {
            assert_eq!(change.interface, 0);
            taken += 1;
        }
        assert_eq!(taken, LINE_STATE_QUEUE_DEPTH);
    }

    #[test]
    fn test_next_tick_returns_early_on_line_coding() {
        let events = BridgeEvents::new();
        events.notify_line_coding(1, LineCoding::with_baud_rate(300));

        // The tick never elapses; the pending change must still get through
        let change = futures::executor::block_on(events.next_tick(core::future::pending::<()>()));

        assert_eq!(change.map(|c| c.coding.baud_rate), Some(300));
        assert!(events.take_line_coding().is_none());
    }

    #[test]
    fn test_next_tick_elapses_without_events() {
        let events = BridgeEvents::new();

        let change = futures::executor::block_on(events.next_tick(core::future::ready(())));

        assert!(change.is_none());
    }

    fn dtr(dtr: bool) -> LineState {
        LineState { dtr, rts: false }
    }

    #[test]
    fn test_tracker_reposts_same_rate_after_other_interface() {
        let events = BridgeEvents::new();
        let default = LineCoding::with_baud_rate(9600);
        let mut port0 = ControlTracker::new(0, default);
        let mut port1 = ControlTracker::new(1, default);

        port0.apply(LineCoding::with_baud_rate(9600), dtr(false), &events);
        assert_eq!(events.take_line_coding().map(|c| c.coding.baud_rate), Some(9600));

        port1.apply(LineCoding::with_baud_rate(115200), dtr(false), &events);
        assert_eq!(events.take_line_coding().map(|c| c.coding.baud_rate), Some(115200));

        // Same rate as interface 0 asked for before, but the UARTs moved since
        port0.apply(LineCoding::with_baud_rate(9600), dtr(false), &events);
        let change = events.take_line_coding().expect("Should post the coding again");
        assert_eq!(change.interface, 0);
        assert_eq!(change.coding.baud_rate, 9600);
    }

    #[test]
    fn test_tracker_posts_initial_default_rate() {
        let events = BridgeEvents::new();
        let default = LineCoding::with_baud_rate(115200);
        let mut port = ControlTracker::new(0, default);

        let update = port.apply(default, LineState::default(), &events);

        assert_eq!(update.coding, Some(default));
        assert!(update.state.is_none());
        assert!(events.take_line_coding().is_some());
    }

    #[test]
    fn test_tracker_dtr_toggle_does_not_reconfigure() {
        let events = BridgeEvents::new();
        let coding = LineCoding::with_baud_rate(57600);
        let mut port = ControlTracker::new(1, coding);

        let update = port.apply(coding, dtr(true), &events);
        assert_eq!(update.coding, None);
        assert_eq!(update.state, Some(dtr(true)));

        let update = port.apply(coding, dtr(false), &events);
        assert_eq!(update.state, Some(dtr(false)));

        assert!(events.take_line_coding().is_none());
        assert_eq!(events.take_line_state().map(|c| c.state), Some(dtr(true)));
        assert_eq!(events.take_line_state().map(|c| c.state), Some(dtr(false)));
    }

    #[test]
    fn test_tracker_coalesced_dtr_and_new_rate() {
        let events = BridgeEvents::new();
        let mut port = ControlTracker::new(0, LineCoding::with_baud_rate(9600));

        let update = port.apply(LineCoding::with_baud_rate(19200), dtr(true), &events);

        assert_eq!(update.coding.map(|c| c.baud_rate), Some(19200));
        assert_eq!(update.state, Some(dtr(true)));
        assert_eq!(events.take_line_coding().map(|c| c.coding.baud_rate), Some(19200));
    }

    #[test]
    fn test_tracker_reset_line_state() {
        let events = BridgeEvents::new();
        let coding = LineCoding::with_baud_rate(9600);
        let mut port = ControlTracker::new(0, coding);
        port.apply(coding, dtr(true), &events);
        while events.take_line_state().is_some() {}

        port.reset_line_state();
        let update = port.apply(coding, dtr(true), &events);

        assert_eq!(update.state, Some(dtr(true)));
        assert_eq!(update.coding, None);
    }
}
