pub mod bridge;
pub mod device;
pub mod serial;
pub mod settings;
pub mod version;

pub use bridge::{Bridge, Token, NULL_TOKEN};
pub use device::{PortEvent, PortList};
pub use serial::{Config, DataBits, ErrorKind, Parity, Port, PurgeSelector, SerialError, StopBits};
pub use settings::Settings;
