use std::time::Duration;

use super::{Config, PurgeSelector, Result};

/// Source of serial devices: the host OS, or a loopback mock in tests.
pub trait SerialBackend: Send + Sync {
    /// Current device paths, in whatever order the host enumerates them.
    fn list_ports(&self) -> Result<Vec<String>>;

    /// Acquire exclusive access to the device at `path`.
    fn open(&self, path: &str) -> Result<Box<dyn SerialDevice>>;
}

/// One open device. Every call maps onto a single OS-level operation.
///
/// A device can be split with [`SerialDevice::try_clone`] so one half reads
/// while the other writes. Line settings, buffers and the OS resource are
/// shared between halves; the read timeout belongs to each half.
pub trait SerialDevice: Send {
    /// A single read of at most `buf.len()` bytes, bounded by the read timeout.
    /// A timeout with no data is `Ok(0)`, not an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// A single write; may accept fewer bytes than offered.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn set_config(&mut self, config: &Config) -> Result<()>;

    /// Live configuration as reported by the driver.
    fn config(&self) -> Result<Config>;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

    fn read_timeout(&self) -> Duration;

    fn purge(&mut self, selector: PurgeSelector) -> Result<()>;

    /// Block until queued output has left the device.
    fn drain(&mut self) -> Result<()>;

    /// Another handle on the same open device.
    fn try_clone(&self) -> Result<Box<dyn SerialDevice>>;

    /// Release this handle. Called at most once per handle; the device is
    /// free again once every handle is closed or dropped.
    fn close(&mut self) -> Result<()>;
}
