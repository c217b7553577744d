//! UART port trait for abstraction and testability
//!
//! This trait defines the primitives the relay needs from a UART peripheral,
//! allowing the actual HAL driver to be swapped with a mock for testing.

/// Pin assignment for one UART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartPins {
    /// Transmit pin (device to target)
    pub tx: u8,
    /// Receive pin (target to device)
    pub rx: u8,
    /// Enable pull-up bias on both pins
    pub pull_up: bool,
}

/// Abstract UART peripheral interface
///
/// Peripheral programming is assumed to always succeed, so none of these
/// operations report errors. Implementations that can fail degrade to
/// dropping data.
pub trait UartPort {
    /// Route the pins to the UART function and apply the pull bias.
    fn configure_pins(&mut self, pins: &UartPins);

    /// Start the peripheral at the given baud rate.
    fn init(&mut self, baud_rate: u32);

    /// Stop the peripheral and discard anything received but not yet read.
    fn deinit(&mut self);

    /// Returns true if at least one received byte is waiting.
    fn is_readable(&mut self) -> bool;

    /// Take one received byte.
    ///
    /// Only meaningful after `is_readable` returned true.
    fn read_byte(&mut self) -> u8;

    /// Write all bytes, returning once the hardware has accepted them.
    fn write_blocking(&mut self, data: &[u8]);
}
