use crate::serial::{Result, SerialBackend, SerialError};

/// Device paths found by the last successful refresh.
///
/// The list keeps its allocation between refreshes so it can be polled
/// repeatedly for hot-plug changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    ports: Vec<String>,
}

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the ports currently present. On failure the
    /// previous contents are left as they were.
    pub fn refresh(&mut self, backend: &dyn SerialBackend) -> Result<()> {
        let found = backend.list_ports()?;
        self.ports.clear();
        self.ports.extend(found);
        log::debug!("Port list refreshed: {} port(s)", self.ports.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&str> {
        self.ports.get(index).map(String::as_str).ok_or_else(|| {
            SerialError::invalid_parameter(format!("port index {} out of range (size {})", index, self.ports.len()))
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.ports.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ports
    }
}
