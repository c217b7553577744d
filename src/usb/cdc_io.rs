//! Packet pumps between a [`CdcFifo`] and async USB endpoints.
//!
//! The pumps are generic over `embedded_io_async` so they run against the
//! embassy-usb CDC-ACM endpoints on hardware and against plain buffers in
//! tests. On the embedded target `CdcReader`/`CdcWriter` provide the
//! Read/Write implementations for the CDC packet-based API.

use embedded_io_async::{Read, Write};

use crate::config::usb::MAX_PACKET_SIZE;

use super::fifo::CdcFifo;

/// One USB packet that has left its source but not yet reached its sink
///
/// Held by the caller across pump calls so a cancelled pump resumes with the
/// bytes it had already taken instead of losing them.
pub struct PendingPacket {
    buf: [u8; MAX_PACKET_SIZE],
    start: usize,
    end: usize,
}

impl PendingPacket {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_PACKET_SIZE],
            start: 0,
            end: 0,
        }
    }

    /// Bytes still to be delivered
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Forget the held bytes, e.g. when the endpoint went away.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    fn fill(&mut self, n: usize) {
        self.start = 0;
        self.end = n;
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn consume(&mut self, n: usize) {
        self.start = core::cmp::min(self.start + n, self.end);
    }
}

impl Default for PendingPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Move one packet from the host into the FIFO.
///
/// Waits for room rather than dropping: while the relay has not caught up,
/// the endpoint is not read and the host is held off by the USB stack.
/// A packet left in `packet` by a cancelled call is finished before the
/// endpoint is read again. Returns the bytes moved into the FIFO.
pub async fn pump_from_host<R: Read, const N: usize>(
    reader: &mut R,
    fifo: &CdcFifo<N>,
    packet: &mut PendingPacket,
) -> Result<usize, R::Error> {
    if packet.is_empty() {
        let n = reader.read(&mut packet.buf).await?;
        packet.fill(n);
    }

    let mut moved = 0;
    while !packet.is_empty() {
        let n = fifo.from_host.write(packet.remaining()).await;
        packet.consume(n);
        moved += n;
    }
    Ok(moved)
}

/// Wait for a flush request, then send everything queued for the host.
///
/// Bytes taken from the FIFO are held in `packet` until the endpoint accepts
/// them, so a cancelled call leaves nothing behind; the next call sends them
/// first without waiting for another flush.
pub async fn pump_to_host<W: Write, const N: usize>(
    writer: &mut W,
    fifo: &CdcFifo<N>,
    packet: &mut PendingPacket,
) -> Result<usize, W::Error> {
    if packet.is_empty() && fifo.pending_to_host() == 0 {
        fifo.flush_requested.wait().await;
    }

    let mut sent = 0;
    loop {
        if packet.is_empty() {
            match fifo.to_host.try_read(&mut packet.buf) {
                Ok(n) => packet.fill(n),
                Err(_) => break,
            }
        }
        while !packet.is_empty() {
            let n = writer.write(packet.remaining()).await?;
            packet.consume(n);
            sent += n;
        }
    }
    writer.flush().await?;
    Ok(sent)
}

/// Run `pump_from_host` until the endpoint fails.
pub async fn run_from_host<R: Read, const N: usize>(
    reader: &mut R,
    fifo: &CdcFifo<N>,
    packet: &mut PendingPacket,
) -> R::Error {
    loop {
        if let Err(e) = pump_from_host(reader, fifo, packet).await {
            return e;
        }
    }
}

/// Run `pump_to_host` until the endpoint fails.
pub async fn run_to_host<W: Write, const N: usize>(
    writer: &mut W,
    fifo: &CdcFifo<N>,
    packet: &mut PendingPacket,
) -> W::Error {
    loop {
        if let Err(e) = pump_to_host(writer, fifo, packet).await {
            return e;
        }
    }
}

#[cfg(feature = "embedded")]
pub use endpoints::{CdcError, CdcReader, CdcWriter};

#[cfg(feature = "embedded")]
mod endpoints {
    use embassy_usb::class::cdc_acm::{LineCoding, Receiver, Sender};
    use embassy_usb::driver::{Driver, EndpointError};
    use embedded_io_async::{ErrorType, Read, Write};

    /// Error type for CDC I/O operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CdcError {
        /// Host deconfigured the interface
        Disabled,
        /// Packet larger than the endpoint allows
        BufferOverflow,
    }

    impl From<EndpointError> for CdcError {
        fn from(e: EndpointError) -> Self {
            match e {
                EndpointError::Disabled => CdcError::Disabled,
                EndpointError::BufferOverflow => CdcError::BufferOverflow,
            }
        }
    }

    impl embedded_io::Error for CdcError {
        fn kind(&self) -> embedded_io::ErrorKind {
            match self {
                CdcError::Disabled => embedded_io::ErrorKind::NotConnected,
                CdcError::BufferOverflow => embedded_io::ErrorKind::InvalidInput,
            }
        }
    }

    /// Wrapper around CDC Receiver that implements embedded_io_async::Read.
    pub struct CdcReader<'d, D: Driver<'d>> {
        inner: Receiver<'d, D>,
    }

    impl<'d, D: Driver<'d>> CdcReader<'d, D> {
        pub fn new(inner: Receiver<'d, D>) -> Self {
            Self { inner }
        }

        /// Wait until the host enables the OUT endpoint.
        pub async fn wait_connection(&mut self) {
            self.inner.wait_connection().await;
        }

        pub fn line_coding(&self) -> LineCoding {
            self.inner.line_coding()
        }

        pub fn dtr(&self) -> bool {
            self.inner.dtr()
        }

        pub fn rts(&self) -> bool {
            self.inner.rts()
        }
    }

    impl<'d, D: Driver<'d>> ErrorType for CdcReader<'d, D> {
        type Error = CdcError;
    }

    impl<'d, D: Driver<'d>> Read for CdcReader<'d, D> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            Ok(self.inner.read_packet(buf).await?)
        }
    }

    /// Wrapper around CDC Sender that implements embedded_io_async::Write.
    ///
    /// Each `write` sends at most one packet. A transfer that ends on a full
    /// packet is terminated with a zero-length packet on `flush`.
    pub struct CdcWriter<'d, D: Driver<'d>> {
        inner: Sender<'d, D>,
        last_was_full: bool,
    }

    impl<'d, D: Driver<'d>> CdcWriter<'d, D> {
        pub fn new(inner: Sender<'d, D>) -> Self {
            Self {
                inner,
                last_was_full: false,
            }
        }

        /// Wait until the host enables the IN endpoint.
        pub async fn wait_connection(&mut self) {
            self.inner.wait_connection().await;
        }
    }

    impl<'d, D: Driver<'d>> ErrorType for CdcWriter<'d, D> {
        type Error = CdcError;
    }

    impl<'d, D: Driver<'d>> Write for CdcWriter<'d, D> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            let packet_size = self.inner.max_packet_size() as usize;
            let n = core::cmp::min(buf.len(), packet_size);
            self.inner.write_packet(&buf[..n]).await?;
            self.last_was_full = n == packet_size;
            Ok(n)
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            if self.last_was_full {
                self.inner.write_packet(&[]).await?;
                self.last_was_full = false;
            }
            Ok(())
        }
    }
}
