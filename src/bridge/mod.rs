//! UART/CDC relay
//!
//! - `channel`: one UART bound to one CDC interface
//! - `relay`: the dual-channel bridge polled by the run loop
//! - `events`: line coding/state notifications from the USB side

pub mod channel;
pub mod events;
pub mod relay;

pub use channel::{ChannelConfig, RelayChannel, RelayCounters, RelayStats};
pub use events::{
    turnaround_micros, BridgeEvents, ControlTracker, ControlUpdate, LineCoding, LineCodingChange,
    LineState, Parity, StopBits, BRIDGE_EVENTS,
};
pub use relay::{Bridge, ConnectionState, PollReport};
