#![cfg_attr(not(test), no_std)]

pub mod bridge;
pub mod config;
pub mod uart;
pub mod usb;

// These modules depend on embassy/esp-hal features only available with embedded feature
#[cfg(feature = "embedded")]
pub mod tasks;
