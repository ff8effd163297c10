//! Sentinel-returning surface consumed by the binding layer.
//!
//! Every call reports failure the way the managed side expects it: a null
//! token, `-1` or `false`, with the cause left in the calling thread's error
//! slot (see [`error_state`]). Handles cross as opaque [`Token`]s.

pub mod error_state;
pub mod registry;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::device::PortList;
use crate::serial::{Config, Port, PurgeSelector, Result, SerialBackend, SerialError, SystemBackend, Window};
use crate::settings::Settings;

pub use error_state::{clear_error, current_error, current_error_kind};
pub use registry::{HandleRegistry, Token, NULL_TOKEN};

use error_state::{or_sentinel, set_error};

static GLOBAL: OnceCell<Bridge> = OnceCell::new();

/// Initialise the process-wide bridge over the host's serial ports.
pub fn init(settings: Settings) -> Result<&'static Bridge> {
    init_with_backend(Arc::new(SystemBackend::new()), settings)
}

/// Initialise the process-wide bridge. Fails with
/// [`SerialError::AlreadyInitialized`] on every call after the first.
pub fn init_with_backend(backend: Arc<dyn SerialBackend>, settings: Settings) -> Result<&'static Bridge> {
    let bridge = Bridge::new(backend, settings)?;
    GLOBAL.set(bridge).map_err(|_| SerialError::AlreadyInitialized)?;
    log::info!("Serial bridge {} initialized", crate::version::lib_version());
    instance().ok_or(SerialError::NotInitialized)
}

/// The process-wide bridge, if [`init`] has run. Records
/// [`SerialError::NotInitialized`] otherwise.
pub fn instance() -> Option<&'static Bridge> {
    let bridge = GLOBAL.get();
    if bridge.is_none() {
        set_error(&SerialError::NotInitialized);
    }
    bridge
}

pub struct Bridge {
    backend: Arc<dyn SerialBackend>,
    settings: Settings,
    registry: HandleRegistry,
    listing: Mutex<PortList>,
}

impl Bridge {
    pub fn new(backend: Arc<dyn SerialBackend>, settings: Settings) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| SerialError::invalid_parameter(e.to_string()))?;
        Ok(Self {
            backend,
            settings,
            registry: HandleRegistry::new(),
            listing: Mutex::new(PortList::new()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn version(&self) -> &'static str {
        crate::version::lib_version()
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.registry.len()
    }

    /// Resolve a token and run `op` on its port. The registry lock is not
    /// held while `op` runs; the port's own read and write locks order calls.
    fn with_port<T>(&self, token: Token, op: impl FnOnce(&Port) -> Result<T>) -> Result<T> {
        let port = self.registry.get(token)?;
        op(&port)
    }

    // --- port listing ---

    /// Refresh a caller-owned listing. `false` on enumeration failure.
    pub fn refresh(&self, list: &mut PortList) -> bool {
        or_sentinel(list.refresh(self.backend.as_ref()).map(|_| true), false)
    }

    pub fn list_size(&self, list: &PortList) -> i32 {
        list.len() as i32
    }

    pub fn list_item<'a>(&self, list: &'a PortList, index: i32) -> Option<&'a str> {
        let item = usize::try_from(index)
            .map_err(|_| SerialError::invalid_parameter(format!("port index {}", index)))
            .and_then(|i| list.get(i));
        or_sentinel(item.map(Some), None)
    }

    /// Current port names, reusing one internal listing across calls.
    pub fn port_names(&self) -> Option<Vec<String>> {
        let mut listing = self.listing.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = listing.refresh(self.backend.as_ref()).map(|_| listing.as_slice().to_vec());
        or_sentinel(result.map(Some), None)
    }

    // --- lifecycle ---

    /// Open `path`; [`NULL_TOKEN`] on failure.
    pub fn open(&self, path: &str) -> Token {
        let result = Port::open_with(self.backend.as_ref(), path, &self.settings).map(|port| self.registry.insert(port));
        if let Ok(token) = result {
            log::debug!("Issued handle {:#x} for {}", token, path);
        }
        or_sentinel(result, NULL_TOKEN)
    }

    /// Close a handle. The token is dead afterwards even when the OS reports
    /// an error. Waits for any transfer in progress on the same handle.
    pub fn close(&self, token: Token) -> bool {
        let result = self.registry.remove(token).and_then(|port| port.close());
        or_sentinel(result.map(|_| true), false)
    }

    // --- configuration ---

    pub fn config(&self, token: Token, baud: i32, data_bits: i32, parity: i32, stop_bits: i32) -> bool {
        let result = Config::from_native(baud, data_bits, parity, stop_bits)
            .and_then(|config| self.with_port(token, |port| port.apply_config(&config)));
        or_sentinel(result.map(|_| true), false)
    }

    pub fn read_config(&self, token: Token) -> Option<Config> {
        or_sentinel(self.with_port(token, |port| port.config()).map(Some), None)
    }

    pub fn get_baud(&self, token: Token) -> i32 {
        self.read_config(token).map(|c| c.baud as i32).unwrap_or(-1)
    }

    pub fn get_data_bits(&self, token: Token) -> i32 {
        self.read_config(token).map(|c| c.data_bits.native_code()).unwrap_or(-1)
    }

    pub fn get_parity(&self, token: Token) -> i32 {
        self.read_config(token).map(|c| c.parity.native_code()).unwrap_or(-1)
    }

    pub fn get_stop_bits(&self, token: Token) -> i32 {
        self.read_config(token).map(|c| c.stop_bits.native_code()).unwrap_or(-1)
    }

    // --- timeouts ---

    pub fn set_read_timeout(&self, token: Token, millis: i64) -> bool {
        let result = u64::try_from(millis)
            .map_err(|_| SerialError::invalid_parameter(format!("negative timeout {}", millis)))
            .and_then(|ms| self.with_port(token, |port| port.set_read_timeout(Duration::from_millis(ms))));
        or_sentinel(result.map(|_| true), false)
    }

    /// Read timeout in milliseconds, `-1` on failure.
    pub fn get_read_timeout(&self, token: Token) -> i64 {
        let result = self
            .with_port(token, |port| port.read_timeout())
            .map(|t| i64::try_from(t.as_millis()).unwrap_or(i64::MAX));
        or_sentinel(result, -1)
    }

    // --- transfers ---

    /// Read into `buf[offset..offset + len]`. Returns the byte count, which
    /// may be short or zero, or `-1` on failure.
    pub fn read(&self, token: Token, buf: &mut [u8], offset: i32, len: i32) -> i32 {
        let result = Window::new(offset, len, buf.len()).and_then(|window| {
            self.with_port(token, |port| port.read_bytes(&mut buf[window.range()]))
        });
        or_sentinel(result.map(|n| n as i32), -1)
    }

    /// Write all of `buf[offset..offset + len]`.
    pub fn write(&self, token: Token, buf: &[u8], offset: i32, len: i32) -> bool {
        let result = Window::new(offset, len, buf.len())
            .and_then(|window| self.with_port(token, |port| port.write_bytes(&buf[window.range()])));
        or_sentinel(result.map(|_| true), false)
    }

    pub fn purge(&self, token: Token, selector: i32) -> bool {
        let result = PurgeSelector::from_native_code(selector)
            .and_then(|selector| self.with_port(token, |port| port.purge(selector)));
        or_sentinel(result.map(|_| true), false)
    }

    /// Block until written bytes are on the wire. No timeout.
    pub fn flush(&self, token: Token) -> bool {
        or_sentinel(self.with_port(token, |port| port.flush_output()).map(|_| true), false)
    }
}
