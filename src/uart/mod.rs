#[cfg(feature = "embedded")]
pub mod esp;
pub mod traits;

#[cfg(feature = "embedded")]
pub use esp::{bias_pins, EspUart};
pub use traits::{UartPins, UartPort};
