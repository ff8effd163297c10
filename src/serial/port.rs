use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Config, PurgeSelector, Result, SerialBackend, SerialDevice, SerialError, TransferEngine};
use crate::settings::Settings;

/// Scratch size used when discarding incoming bytes.
const SKIP_BUFFER_SIZE: usize = 1024;

type Half = Mutex<Option<Box<dyn SerialDevice>>>;

fn lock(half: &Half) -> MutexGuard<'_, Option<Box<dyn SerialDevice>>> {
    half.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn open_half(guard: &mut Option<Box<dyn SerialDevice>>) -> Result<&mut dyn SerialDevice> {
    match guard.as_mut() {
        Some(device) => Ok(&mut **device),
        None => Err(SerialError::InvalidHandle),
    }
}

/// An open serial device, usable from several threads.
///
/// The device is split into a read half and a write half, each behind its own
/// lock, so one thread can sit in a blocking read while another writes.
/// Reads are serialised against reads and writes (and flushes) against
/// writes. Configuration, timeouts, purge and close take both halves, reader
/// first, and so wait for transfers in flight.
///
/// After [`Port::close`] every operation, including a second close, fails
/// with [`SerialError::InvalidHandle`] without reaching the OS. Dropping an
/// open port releases the device.
pub struct Port {
    name: String,
    reader: Half,
    writer: Half,
    open: AtomicBool,
    engine: TransferEngine,
    last_config: Mutex<Option<Config>>,
}

impl Port {
    /// Open `path` with default settings.
    pub fn open(backend: &dyn SerialBackend, path: &str) -> Result<Self> {
        Self::open_with(backend, path, &Settings::default())
    }

    pub fn open_with(backend: &dyn SerialBackend, path: &str, settings: &Settings) -> Result<Self> {
        let engine = TransferEngine::new(settings.chunk_size)?;
        let mut reader = backend.open(path)?;
        let writer = match reader.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                log::warn!("Failed to split {} into read and write halves: {}", path, e);
                if let Err(close_err) = reader.close() {
                    log::warn!("{} closed with error: {}", path, close_err);
                }
                return Err(e);
            }
        };
        let port = Self {
            name: path.to_string(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
            engine,
            last_config: Mutex::new(None),
        };

        // Anything that fails past this point must not leave the device held.
        if let Err(e) = port.prepare(settings) {
            log::warn!("Failed to prepare {}: {}", path, e);
            if let Err(close_err) = port.close() {
                log::warn!("{} closed with error: {}", path, close_err);
            }
            return Err(e);
        }
        Ok(port)
    }

    fn prepare(&self, settings: &Settings) -> Result<()> {
        self.set_read_timeout(Duration::from_millis(settings.default_read_timeout_ms))?;
        match settings.default_config {
            Some(config) => self.apply_config(&config),
            None => {
                let config = self.config()?;
                self.remember(config);
                Ok(())
            }
        }
    }

    fn remember(&self, config: Config) {
        *self.last_config.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
    }

    /// Run `op` on the write half while holding both halves.
    fn control<T>(&self, op: impl FnOnce(&mut dyn SerialDevice, &mut dyn SerialDevice) -> Result<T>) -> Result<T> {
        let mut reader = lock(&self.reader);
        let mut writer = lock(&self.writer);
        op(open_half(&mut reader)?, open_half(&mut writer)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn chunk_size(&self) -> usize {
        self.engine.chunk_size()
    }

    /// Validate and apply all four line settings. On rejection the driver
    /// keeps its previous configuration.
    pub fn apply_config(&self, config: &Config) -> Result<()> {
        config.validate()?;
        self.control(|_, writer| writer.set_config(config))?;
        log::debug!("{} configured to {} {}", self.name, config.baud, config);
        self.remember(*config);
        Ok(())
    }

    /// Live configuration as reported by the driver.
    pub fn config(&self) -> Result<Config> {
        self.control(|_, writer| writer.config())
    }

    /// Timeout for a single read. Zero polls.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        self.control(|reader, _| reader.set_read_timeout(timeout))
    }

    pub fn read_timeout(&self) -> Result<Duration> {
        self.control(|reader, _| Ok(reader.read_timeout()))
    }

    /// One device read of at most one chunk. Short reads, including zero
    /// bytes when the timeout elapses, are not errors.
    pub fn read_bytes(&self, out: &mut [u8]) -> Result<usize> {
        let mut reader = lock(&self.reader);
        self.engine.read(open_half(&mut reader)?, out)
    }

    /// Send all of `data` in chunk-sized writes. Stops at the first failing
    /// chunk; bytes already sent stay sent.
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        self.engine.write(open_half(&mut writer)?, data)
    }

    /// Discard driver-buffered bytes that have not been transferred yet.
    pub fn purge(&self, selector: PurgeSelector) -> Result<()> {
        self.control(|_, writer| writer.purge(selector))?;
        log::debug!("{} purged {:?}", self.name, selector);
        Ok(())
    }

    /// Block until everything written has left the device. There is no
    /// timeout: a line that cannot drain blocks forever.
    pub fn flush_output(&self) -> Result<()> {
        let mut writer = lock(&self.writer);
        open_half(&mut writer)?.drain()
    }

    /// Read and discard up to `n` incoming bytes, stopping early when a read
    /// comes back empty.
    pub fn skip(&self, n: u64) -> Result<u64> {
        let mut scratch = [0u8; SKIP_BUFFER_SIZE];
        let mut remaining = n;
        while remaining > 0 {
            let want = remaining.min(scratch.len() as u64) as usize;
            let read = self.read_bytes(&mut scratch[..want])?;
            if read == 0 {
                break;
            }
            remaining -= read as u64;
        }
        Ok(n - remaining)
    }

    /// Release the device. The port is closed afterwards even if the OS
    /// reports an error.
    pub fn close(&self) -> Result<()> {
        let mut reader = lock(&self.reader);
        let mut writer = lock(&self.writer);
        let (mut rx, mut tx) = match (reader.take(), writer.take()) {
            (Some(rx), Some(tx)) => (rx, tx),
            _ => return Err(SerialError::InvalidHandle),
        };
        self.open.store(false, Ordering::Release);

        let result = rx.close().and(tx.close());
        match &result {
            Ok(()) => log::info!("Closed serial port {}", self.name),
            Err(e) => log::warn!("{} closed with error: {}", self.name, e),
        }
        result
    }
}
impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("chunk_size", &self.engine.chunk_size())
            .finish()
    }
}

impl fmt::Display for Port {
    /// Uses the last configuration applied or read, so formatting never
    /// waits behind a blocked transfer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = *self.last_config.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write!(f, "{}", self.name)?;
        if let Some(config) = config {
            write!(f, " {} {}", config.baud, config)?;
        }
        if !self.is_open() {
            write!(f, " (closed)")?;
        }
        Ok(())
    }
}

impl From<SerialError> for io::Error {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::IoError(e) => e,
            SerialError::InvalidParameter(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            SerialError::InvalidHandle => io::Error::new(io::ErrorKind::NotConnected, e),
            SerialError::PortNotFound(_) => io::Error::new(io::ErrorKind::NotFound, e),
            SerialError::AccessDenied(_) => io::Error::new(io::ErrorKind::PermissionDenied, e),
            SerialError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

// Streams work on `&Port` as they do on `&TcpStream`, so a reader thread and
// a writer thread can share one port.
impl io::Read for &Port {
    /// A closed port reads as end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Ok(0);
        }
        Ok(self.read_bytes(buf)?)
    }
}

impl io::Write for &Port {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(self.engine.chunk_size());
        self.write_bytes(&buf[..len])?;
        Ok(len)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_output()?)
    }
}

impl io::Read for Port {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for Port {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }
}
