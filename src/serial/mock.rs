//! In-process loopback serial lines.
//!
//! Each line has a device end, opened through [`MockBackend`] like any other
//! port, and a [`MockPeer`] end standing in for whatever is attached to the
//! cable. Bytes written by the device sit in a driver-side output queue until
//! they are drained onto the wire (by `flush` or by the peer receiving), so
//! purges behave the way they do on a real UART.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{Config, PurgeSelector, Result, SerialBackend, SerialDevice, SerialError};

#[derive(Debug, Default)]
struct LineState {
    /// Arrived from the peer, not yet read by the device.
    rx: VecDeque<u8>,
    /// Written by the device, not yet transmitted.
    tx: VecDeque<u8>,
    /// Transmitted, not yet collected by the peer.
    wire: Vec<u8>,
    config: Config,
    /// Device handles currently holding the line.
    handles: usize,
    unplugged: bool,
    write_sizes: Vec<usize>,
    max_write: Option<usize>,
    writes_before_failure: Option<usize>,
    rejected_bauds: Vec<u32>,
    fail_next_close: bool,
}

impl LineState {
    fn drain_tx(&mut self) {
        let pending: Vec<u8> = self.tx.drain(..).collect();
        self.wire.extend(pending);
    }
}

#[derive(Debug, Default)]
struct Line {
    state: Mutex<LineState>,
    data_ready: Condvar,
}

impl Line {
    fn lock(&self) -> MutexGuard<'_, LineState> {
        // A panicking test thread must not wedge every other user of the line.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unplugged_error() -> SerialError {
    SerialError::IoError(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device unplugged"))
}

/// Backend serving named loopback lines such as `MOCK0`.
#[derive(Debug, Default)]
pub struct MockBackend {
    lines: Mutex<BTreeMap<String, Arc<Line>>>,
    fail_listing: Mutex<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(names: &[&str]) -> Self {
        let backend = Self::new();
        for name in names {
            backend.add_port(name);
        }
        backend
    }

    fn lines(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Line>>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Plug in a new line and return its far end.
    pub fn add_port(&self, name: &str) -> MockPeer {
        let line = self.lines().entry(name.to_string()).or_default().clone();
        MockPeer { line }
    }

    /// Unplug a line. An open device on it fails every later transfer.
    pub fn remove_port(&self, name: &str) -> bool {
        match self.lines().remove(name) {
            Some(line) => {
                line.lock().unplugged = true;
                line.data_ready.notify_all();
                true
            }
            None => false,
        }
    }

    pub fn peer(&self, name: &str) -> Option<MockPeer> {
        self.lines().get(name).map(|line| MockPeer { line: line.clone() })
    }

    /// Make the next `list_ports` calls fail until reset.
    pub fn set_listing_fails(&self, fail: bool) {
        *self.fail_listing.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = fail;
    }
}

impl SerialBackend for MockBackend {
    fn list_ports(&self) -> Result<Vec<String>> {
        if *self.fail_listing.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "enumeration failed",
            )));
        }
        Ok(self.lines().keys().cloned().collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>> {
        let line = self
            .lines()
            .get(path)
            .cloned()
            .ok_or_else(|| SerialError::PortNotFound(path.to_string()))?;

        {
            let mut state = line.lock();
            if state.handles > 0 {
                return Err(SerialError::AccessDenied(format!("{} is busy", path)));
            }
            state.handles = 1;
        }

        log::debug!("Opened mock port {}", path);
        Ok(Box::new(MockDevice {
            name: path.to_string(),
            line,
            timeout: Duration::ZERO,
            closed: false,
        }))
    }
}

/// Device end of a loopback line.
pub struct MockDevice {
    name: String,
    line: Arc<Line>,
    timeout: Duration,
    closed: bool,
}

impl MockDevice {
    fn state(&self) -> Result<MutexGuard<'_, LineState>> {
        if self.closed {
            return Err(SerialError::InvalidHandle);
        }
        let state = self.line.lock();
        if state.unplugged {
            return Err(unplugged_error());
        }
        Ok(state)
    }
}

impl SerialDevice for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state()?;
        let deadline = Instant::now() + self.timeout;
        while state.rx.is_empty() && !state.unplugged {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .line
                .data_ready
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        if state.unplugged {
            return Err(unplugged_error());
        }

        let n = buf.len().min(state.rx.len());
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state()?;
        if let Some(remaining) = state.writes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(SerialError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected write failure",
                )));
            }
            *remaining -= 1;
        }

        let n = buf.len().min(state.max_write.unwrap_or(usize::MAX));
        state.tx.extend(&buf[..n]);
        state.write_sizes.push(n);
        Ok(n)
    }

    fn set_config(&mut self, config: &Config) -> Result<()> {
        let mut state = self.state()?;
        if state.rejected_bauds.contains(&config.baud) {
            return Err(SerialError::Unsupported(format!("baud {} on {}", config.baud, self.name)));
        }
        state.config = *config;
        Ok(())
    }

    fn config(&self) -> Result<Config> {
        Ok(self.state()?.config)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        drop(self.state()?);
        self.timeout = timeout;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn purge(&mut self, selector: PurgeSelector) -> Result<()> {
        let mut state = self.state()?;
        match selector {
            PurgeSelector::Input => state.rx.clear(),
            PurgeSelector::Output => state.tx.clear(),
            PurgeSelector::Both => {
                state.rx.clear();
                state.tx.clear();
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.state()?.drain_tx();
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn SerialDevice>> {
        self.state()?.handles += 1;
        Ok(Box::new(MockDevice {
            name: self.name.clone(),
            line: self.line.clone(),
            timeout: self.timeout,
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(SerialError::InvalidHandle);
        }
        self.closed = true;
        let mut state = self.line.lock();
        state.handles = state.handles.saturating_sub(1);
        if std::mem::take(&mut state.fail_next_close) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected close failure",
            )));
        }
        log::debug!("Closed mock port {}", self.name);
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if !self.closed {
            let mut state = self.line.lock();
            state.handles = state.handles.saturating_sub(1);
        }
    }
}

/// Far end of a loopback line.
#[derive(Clone)]
pub struct MockPeer {
    line: Arc<Line>,
}

impl MockPeer {
    /// Put bytes on the wire towards the device.
    pub fn send(&self, data: &[u8]) {
        self.line.lock().rx.extend(data);
        self.line.data_ready.notify_all();
    }

    /// Collect everything the device has transmitted so far, draining its
    /// output queue onto the wire first.
    pub fn receive(&self) -> Vec<u8> {
        let mut state = self.line.lock();
        state.drain_tx();
        std::mem::take(&mut state.wire)
    }

    /// Collect only what has already been transmitted, leaving queued output alone.
    pub fn receive_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.line.lock().wire)
    }

    pub fn pending_output(&self) -> usize {
        self.line.lock().tx.len()
    }

    pub fn pending_input(&self) -> usize {
        self.line.lock().rx.len()
    }

    /// Size of each device-level write, in order.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.line.lock().write_sizes.clone()
    }

    pub fn config(&self) -> Config {
        self.line.lock().config
    }

    pub fn is_open(&self) -> bool {
        self.line.lock().handles > 0
    }

    /// Cap how many bytes a single device write accepts.
    pub fn limit_write_size(&self, max: usize) {
        self.line.lock().max_write = Some(max);
    }

    /// Let `count` more device writes succeed, then fail every write.
    pub fn fail_writes_after(&self, count: usize) {
        self.line.lock().writes_before_failure = Some(count);
    }

    pub fn reject_baud(&self, baud: u32) {
        self.line.lock().rejected_bauds.push(baud);
    }

    pub fn fail_next_close(&self) {
        self.line.lock().fail_next_close = true;
    }
}
