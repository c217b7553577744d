//! Embassy tasks module
//!
//! Async task bodies for the firmware. `main` wraps them in
//! `#[embassy_executor::task]` functions with concrete hardware types.

pub mod bridge;
pub mod usb;

pub use bridge::bridge_task;
pub use usb::{cdc_port_task, usb_device_task};
