use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::{Config, PurgeSelector, Result, SerialBackend, SerialDevice, SerialError};

/// Baud rate the OS port is opened with before the caller configures it.
pub const OPEN_BAUD_RATE: u32 = 9600;

/// First pause after a write finds the output buffer full.
const WRITE_RETRY_MIN: Duration = Duration::from_millis(1);
/// Longest pause between attempts while the line stays blocked.
const WRITE_RETRY_MAX: Duration = Duration::from_millis(50);

/// Host serial ports, driven through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for SystemBackend {
    fn list_ports(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>> {
        // serialport claims the tty exclusively (TIOCEXCL) on unix; Windows
        // COM handles are exclusive by nature.
        let port = serialport::new(path, OPEN_BAUD_RATE)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| map_open_error(path, e))?;

        log::info!("Opened serial port {}", path);
        Ok(Box::new(SystemDevice::new(path, port)))
    }
}

fn map_open_error(path: &str, e: serialport::Error) -> SerialError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => SerialError::PortNotFound(path.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => SerialError::PortNotFound(path.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            SerialError::AccessDenied(format!("{}: {}", path, e))
        }
        _ => SerialError::SerialportError(e),
    }
}

pub struct SystemDevice {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SystemDevice {
    pub fn new(name: &str, port: Box<dyn SerialPort>) -> Self {
        Self {
            name: name.to_string(),
            port: Some(port),
        }
    }

    fn port(&self) -> Result<&dyn SerialPort> {
        self.port.as_deref().ok_or(SerialError::InvalidHandle)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SerialError::InvalidHandle)
    }

    fn apply(port: &mut Box<dyn SerialPort>, config: &Config) -> Result<()> {
        let parity = serialport::Parity::try_from(config.parity)?;
        let stop_bits = serialport::StopBits::try_from(config.stop_bits)?;
        port.set_baud_rate(config.baud)?;
        port.set_data_bits(config.data_bits.into())?;
        port.set_parity(parity)?;
        port.set_stop_bits(stop_bits)?;
        Ok(())
    }
}

impl SerialDevice for SystemDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port_mut()?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        write_with_backoff(&mut **port, buf, std::thread::sleep)
    }

    fn set_config(&mut self, config: &Config) -> Result<()> {
        // Reject what this driver cannot express before touching the device.
        serialport::Parity::try_from(config.parity)?;
        serialport::StopBits::try_from(config.stop_bits)?;

        let previous = self.config()?;
        let name = self.name.clone();
        let port = self.port_mut()?;
        if let Err(e) = Self::apply(port, config) {
            log::warn!("Driver rejected {} {} on {}: {}", config.baud, config, name, e);
            if let Err(rollback) = Self::apply(port, &previous) {
                log::error!("Failed to restore previous configuration on {}: {}", name, rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    fn config(&self) -> Result<Config> {
        let port = self.port()?;
        Ok(Config {
            baud: port.baud_rate()?,
            data_bits: port.data_bits()?.into(),
            parity: port.parity()?.into(),
            stop_bits: port.stop_bits()?.into(),
        })
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port_mut()?.set_timeout(timeout)?;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.port.as_ref().map(|p| p.timeout()).unwrap_or_default()
    }

    fn purge(&mut self, selector: PurgeSelector) -> Result<()> {
        self.port_mut()?.clear(selector.into())?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.port_mut()?.flush()?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn SerialDevice>> {
        let port = self.port()?.try_clone()?;
        Ok(Box::new(SystemDevice::new(&self.name, port)))
    }

    fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(port) => {
                drop(port);
                log::debug!("Released handle on {}", self.name);
                Ok(())
            }
            None => Err(SerialError::InvalidHandle),
        }
    }
}

/// One write that waits for the line to take data.
///
/// serialport applies the port timeout to writes as well, so a full output
/// buffer surfaces as `TimedOut`. Retry with a growing pause until the line
/// accepts something; writes have no deadline.
fn write_with_backoff<W: Write + ?Sized>(
    port: &mut W,
    buf: &[u8],
    mut sleep: impl FnMut(Duration),
) -> Result<usize> {
    let mut pause = WRITE_RETRY_MIN;
    loop {
        match port.write(buf) {
            Ok(n) => return Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                sleep(pause);
                pause = (pause * 2).min(WRITE_RETRY_MAX);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SerialError::IoError(e)),
        }
    }
}
