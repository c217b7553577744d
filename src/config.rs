//! Hardware configuration constants for the ESP32-S3 dual UART bridge

/// First bridged UART (UART1), paired with CDC interface 0
pub mod uart0 {
    pub const TX_PIN: u8 = 17;
    pub const RX_PIN: u8 = 18;
    pub const BAUD_RATE: u32 = 115200;
}

/// Second bridged UART (UART2), paired with CDC interface 1
pub mod uart1 {
    pub const TX_PIN: u8 = 15;
    pub const RX_PIN: u8 = 16;
    pub const BAUD_RATE: u32 = 115200;
}

/// Relay sizing
pub mod relay {
    /// Number of UART/CDC channel pairs
    pub const CHANNEL_COUNT: usize = 2;

    /// Channel whose CDC transport reports host presence and receives
    /// the FIFO purge on a line-coding change
    pub const PRIMARY_CHANNEL: usize = 0;

    /// Per-direction relay buffer, one full-speed bulk packet
    pub const BUFFER_SIZE: usize = 64;

    /// Upper bound on host bytes written to a UART per poll.
    /// Keeps the blocking UART write short so the receive side is not starved.
    pub const USB_TO_UART_CHUNK: usize = 16;
}

/// Poll cadence derived from the line coding
pub mod timing {
    /// Symbols the scheduler lets accumulate in the UART FIFO between polls
    pub const FIFO_BATCH_SYMBOLS: u32 = 16;

    /// Start + 8 data + stop
    pub const BITS_PER_SYMBOL: u32 = 10;

    pub const MICROS_PER_SECOND: u32 = 1_000_000;

    /// How often the run loop logs relay totals
    pub const STATS_LOG_INTERVAL_SECS: u64 = 10;
}

/// USB device configuration
pub mod usb {
    /// pid.codes test VID/PID
    pub const VID: u16 = 0x1209;
    pub const PID: u16 = 0x0001;

    pub const MANUFACTURER: &str = "cdc-uart-bridge";
    pub const PRODUCT: &str = "Dual UART Bridge";
    pub const SERIAL_NUMBER: &str = "000001";

    /// Full-speed bulk endpoint size
    pub const MAX_PACKET_SIZE: usize = 64;

    /// Depth of each direction of a CDC transport FIFO
    pub const FIFO_SIZE: usize = 256;

    /// Pending DTR/RTS notifications held for the poll loop
    pub const LINE_STATE_QUEUE_DEPTH: usize = 4;
}
