//! USB CDC transport for the two bridged interfaces.
//!
//! - `traits`: the byte-queue view the relay polls
//! - `fifo`: pipe-backed implementation shared with the USB tasks
//! - `cdc_io`: async pumps between the FIFOs and the CDC-ACM endpoints

pub mod cdc_io;
pub mod fifo;
pub mod traits;

pub use fifo::CdcFifo;
pub use traits::CdcPort;
