//! Relay run loop
//!
//! Cooperative scheduler for the bridge: one `step` per tick, with the tick
//! length taken from the current line coding.

use embassy_time::{Duration, Instant, Timer};

use crate::bridge::{Bridge, BridgeEvents, ConnectionState};
use crate::config::timing::STATS_LOG_INTERVAL_SECS;
use crate::uart::UartPort;
use crate::usb::CdcPort;

/// Task that drives the relay forever.
///
/// Host notifications posted to `events` are applied at the start of the
/// next tick, so the relay state is only ever touched from this task. A
/// line-coding change cuts the current tick short.
pub async fn bridge_task<U: UartPort, C: CdcPort>(
    mut bridge: Bridge<U, C>,
    events: &'static BridgeEvents,
) -> ! {
    bridge.init();
    log::info!("Bridge: polling every {}us", bridge.poll_interval_us());

    let stats_interval = Duration::from_secs(STATS_LOG_INTERVAL_SECS);
    let mut next_report = Instant::now() + stats_interval;
    let mut link = ConnectionState::Disconnected;
    loop {
        link = bridge.step(events, link).link;

        let tick = Timer::after_micros(u64::from(bridge.poll_interval_us()));
        if let Some(change) = events.next_tick(tick).await {
            bridge.on_line_coding(change.interface, &change.coding);
        }

        if Instant::now() >= next_report {
            bridge.report_counters();
            next_report = Instant::now() + stats_interval;
        }
    }
}
