pub mod list;
pub mod port_monitor;

pub use list::PortList;
pub use port_monitor::{create_port_monitor, PollingPortMonitor, PortEvent, PortMonitor};
