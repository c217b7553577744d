//! ESP32-S3 UART adapter
//!
//! Wraps a blocking `esp_hal` UART driver behind [`UartPort`].
//!
//! esp-hal binds pins when the driver is built, so the pin setup happens in
//! [`bias_pins`] before `Uart::with_tx`/`with_rx`, and `configure_pins` only
//! checks the request against what was applied.

use esp_hal::gpio::interconnect::{InputSignal, OutputSignal};
use esp_hal::gpio::{AnyPin, Flex, InputConfig, Level, OutputConfig, Pull};
use esp_hal::uart::{Config, Uart};
use esp_hal::Blocking;

use super::traits::{UartPins, UartPort};

/// Upper bound on stale bytes read back out of the RX FIFO by `deinit`
const RX_FIFO_DEPTH: usize = 128;

/// Apply the pull bias to a UART pin pair and hand back the signals to bind.
///
/// TX idles high so the line never shows a spurious start bit. Returns the
/// assignment actually applied, for [`EspUart::new`].
pub fn bias_pins(
    tx: AnyPin<'static>,
    rx: AnyPin<'static>,
    pull_up: bool,
) -> (OutputSignal<'static>, InputSignal<'static>, UartPins) {
    let applied = UartPins {
        tx: tx.number(),
        rx: rx.number(),
        pull_up,
    };
    let pull = if pull_up { Pull::Up } else { Pull::None };

    let mut tx = Flex::new(tx);
    tx.set_level(Level::High);
    tx.apply_output_config(&OutputConfig::default().with_pull(pull));
    tx.set_output_enable(true);

    let mut rx = Flex::new(rx);
    rx.apply_input_config(&InputConfig::default().with_pull(pull));
    rx.set_input_enable(true);

    (tx.into_peripheral_output(), rx.peripheral_input(), applied)
}

/// `esp_hal` UART driving one relay channel
pub struct EspUart {
    uart: Uart<'static, Blocking>,
    /// Peripheral index, for log output only
    index: u8,
    /// Pins bound to `uart` by `bias_pins`
    applied: UartPins,
    /// Cleared by `deinit` so no relay I/O reaches the peripheral until the next `init`
    enabled: bool,
}

impl EspUart {
    /// Wrap a UART whose pins were set up by [`bias_pins`].
    pub fn new(uart: Uart<'static, Blocking>, index: u8, applied: UartPins) -> Self {
        Self {
            uart,
            index,
            applied,
            enabled: false,
        }
    }

    /// Pin assignment in effect on the hardware
    pub fn applied_pins(&self) -> UartPins {
        self.applied
    }
}

impl UartPort for EspUart {
    fn configure_pins(&mut self, pins: &UartPins) {
        if *pins != self.applied {
            log::warn!(
                "UART{}: requested {:?} but bound {:?}",
                self.index,
                pins,
                self.applied
            );
            return;
        }
        log::debug!(
            "UART{}: tx=GPIO{} rx=GPIO{} pull_up={}",
            self.index,
            pins.tx,
            pins.rx,
            pins.pull_up
        );
    }

    fn init(&mut self, baud_rate: u32) {
        match self
            .uart
            .apply_config(&Config::default().with_baudrate(baud_rate))
        {
            Ok(()) => {
                self.enabled = true;
                log::debug!("UART{}: {} baud", self.index, baud_rate);
            }
            Err(e) => log::warn!("UART{}: config {} baud failed ({:?})", self.index, baud_rate, e),
        }
    }

    fn deinit(&mut self) {
        if self.enabled {
            let _ = self.uart.flush();
        }
        self.enabled = false;

        // Bytes received at the old rate must not reach the host after init
        let mut byte = [0u8; 1];
        let mut discarded = 0;
        while discarded < RX_FIFO_DEPTH && self.uart.read_ready() {
            if self.uart.read(&mut byte).is_err() {
                break;
            }
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("UART{}: discarded {} stale rx bytes", self.index, discarded);
        }
    }

    fn is_readable(&mut self) -> bool {
        self.enabled && self.uart.read_ready()
    }

    fn read_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte) {
            Ok(1) => byte[0],
            _ => 0,
        }
    }

    fn write_blocking(&mut self, data: &[u8]) {
        if !self.enabled {
            return;
        }

        let mut remaining = data;
        while !remaining.is_empty() {
            match self.uart.write(remaining) {
                Ok(n) => remaining = &remaining[n..],
                Err(e) => {
                    log::warn!("UART{}: tx error ({:?}), dropped {} bytes", self.index, e, remaining.len());
                    return;
                }
            }
        }
        let _ = self.uart.flush();
    }
}
