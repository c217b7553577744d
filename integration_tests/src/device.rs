//! Bridge port client.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

/// USB product string reported by the firmware
const PRODUCT: &str = "Dual UART Bridge";

/// Find the bridge's CDC ports by scanning ttyACM devices.
/// Returns the port names in interface order.
pub fn find_bridge_ports() -> Result<Vec<String>> {
    let mut ports: Vec<String> = serialport::available_ports()?
        .into_iter()
        .filter(|info| match &info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                usb.product.as_deref() == Some(PRODUCT)
            }
            _ => false,
        })
        .map(|info| info.port_name)
        // Filter to ttyACM devices (CDC-ACM)
        .filter(|name| name.contains("ttyACM"))
        .collect();

    ports.sort();
    Ok(ports)
}

/// Resolve two port arguments - returns them as given if not "auto", otherwise auto-detects.
pub fn resolve_ports(port_a: &str, port_b: &str) -> Result<(String, String)> {
    if port_a != "auto" && port_b != "auto" {
        return Ok((port_a.to_string(), port_b.to_string()));
    }

    let ports = find_bridge_ports()?;
    if ports.len() < 2 {
        anyhow::bail!(
            "Need both bridge interfaces, found {}. Ports: {:?}",
            ports.len(),
            ports
        );
    }

    let a = if port_a == "auto" { ports[0].clone() } else { port_a.to_string() };
    let b = if port_b == "auto" { ports[1].clone() } else { port_b.to_string() };
    Ok((a, b))
}

/// Client for one CDC interface of the bridge.
pub struct BridgePort {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl BridgePort {
    /// Open the port. Opening asserts DTR, which the bridge sees as a connection.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Change the line coding. The bridge reprograms both UARTs.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        Ok(())
    }

    /// Drain all pending data from the serial port.
    /// Reads until no more data is available (with a short timeout).
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read exactly `len` bytes or fail on timeout.
    pub fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; 256];
        let start = Instant::now();

        while data.len() < len && start.elapsed() < self.timeout {
            let want = (len - data.len()).min(buf.len());
            match self.port.read(&mut buf[..want]) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if data.len() < len {
            anyhow::bail!(
                "Timeout waiting for {} bytes, got {}: {:02x?}",
                len,
                data.len(),
                data
            );
        }
        Ok(data)
    }

    /// Collect whatever arrives within `window`.
    pub fn receive_for(&mut self, window: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = [0u8; 256];
        let start = Instant::now();

        while start.elapsed() < window {
            match self.port.read(&mut buf) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(data)
    }

    /// Send `data` and expect it back through the UART loopback.
    pub fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.send(data)?;
        self.receive(data.len())
    }
}
