pub mod backend;
pub mod config;
pub mod interface;
pub mod mock;
pub mod port;
pub mod transfer;

pub use backend::{SerialBackend, SerialDevice};
pub use config::{Config, DataBits, Parity, PurgeSelector, StopBits};
pub use interface::{SystemBackend, SystemDevice};
pub use port::Port;
pub use transfer::{TransferEngine, Window, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Coarse error classes reported across the binding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad offset, length, timeout or configuration value. Rejected before any device access.
    InvalidParameter,
    /// Operation on a closed, stale or forged handle.
    InvalidHandle,
    /// Open, configuration or I/O failure reported by the OS.
    DeviceUnavailable,
    /// Permission denied or device held exclusively by someone else.
    AccessDenied,
    /// A timeout elapsed. Reads encode this as a short result, so it only
    /// surfaces from operations that cannot return partial data.
    Interrupted,
    Unknown,
}

impl ErrorKind {
    pub const NONE_CODE: i32 = 0;

    /// Integer code stored in the boundary error state.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Unknown => -1,
            ErrorKind::InvalidParameter => -2,
            ErrorKind::DeviceUnavailable => -3,
            ErrorKind::AccessDenied => -4,
            ErrorKind::InvalidHandle => -5,
            ErrorKind::Interrupted => -7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(ErrorKind::Unknown),
            -2 => Some(ErrorKind::InvalidParameter),
            -3 => Some(ErrorKind::DeviceUnavailable),
            -4 => Some(ErrorKind::AccessDenied),
            -5 => Some(ErrorKind::InvalidHandle),
            -7 => Some(ErrorKind::Interrupted),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid handle")]
    InvalidHandle,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unsupported by device driver: {0}")]
    Unsupported(String),

    #[error("Native interface already initialized")]
    AlreadyInitialized,

    #[error("Native interface not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        SerialError::InvalidParameter(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SerialError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            SerialError::InvalidHandle => ErrorKind::InvalidHandle,
            SerialError::PortNotFound(_) | SerialError::Unsupported(_) => ErrorKind::DeviceUnavailable,
            SerialError::AccessDenied(_) => ErrorKind::AccessDenied,
            SerialError::AlreadyInitialized | SerialError::NotInitialized => ErrorKind::Unknown,
            SerialError::IoError(e) => io_kind(e.kind()),
            SerialError::SerialportError(e) => match e.kind() {
                serialport::ErrorKind::NoDevice => ErrorKind::DeviceUnavailable,
                serialport::ErrorKind::InvalidInput => ErrorKind::InvalidParameter,
                serialport::ErrorKind::Io(kind) => io_kind(kind),
                serialport::ErrorKind::Unknown => ErrorKind::Unknown,
            },
        }
    }
}

fn io_kind(kind: std::io::ErrorKind) -> ErrorKind {
    use std::io::ErrorKind as Io;
    match kind {
        Io::PermissionDenied | Io::AddrInUse | Io::WouldBlock => ErrorKind::AccessDenied,
        Io::TimedOut => ErrorKind::Interrupted,
        Io::InvalidInput => ErrorKind::InvalidParameter,
        Io::NotFound
        | Io::BrokenPipe
        | Io::UnexpectedEof
        | Io::ConnectionAborted
        | Io::ConnectionReset
        | Io::NotConnected
        | Io::Unsupported
        | Io::Interrupted
        | Io::WriteZero
        | Io::Other => ErrorKind::DeviceUnavailable,
        _ => ErrorKind::Unknown,
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
