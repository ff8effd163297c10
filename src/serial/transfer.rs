//! Chunked transfers between callers and a [`SerialDevice`].
//!
//! The binding boundary only moves bytes through a bounded window, so every
//! OS-level read or write is capped at the engine's chunk size. Reads are
//! single-shot: one call, at most one chunk. Writes loop over chunks until the
//! whole input is on its way or one chunk fails.

use super::{Result, SerialDevice, SerialError};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Upper bound for a configured chunk size.
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Number of bytes of each chunk included in trace logs.
const TRACE_PREVIEW: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl TransferEngine {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(SerialError::invalid_parameter(format!(
                "chunk size {} outside 1..={}",
                chunk_size, MAX_CHUNK_SIZE
            )));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// One device read into the front of `out`, never more than one chunk.
    pub fn read(&self, device: &mut dyn SerialDevice, out: &mut [u8]) -> Result<usize> {
        let len = out.len().min(self.chunk_size);
        if len == 0 {
            return Ok(0);
        }

        let n = device.read(&mut out[..len])?;
        if n > len {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("device reported {} bytes for a {} byte read", n, len),
            )));
        }
        if n > 0 {
            log::trace!("rx {} bytes: {}", n, preview(&out[..n]));
        }
        Ok(n)
    }

    /// Send all of `data`, one chunk per device write.
    pub fn write(&self, device: &mut dyn SerialDevice, data: &[u8]) -> Result<()> {
        let mut sent = 0;
        for chunk in data.chunks(self.chunk_size) {
            if let Err(e) = write_chunk(device, chunk) {
                log::warn!("Write aborted after {} of {} bytes: {}", sent, data.len(), e);
                return Err(e);
            }
            sent += chunk.len();
            log::trace!("tx {} bytes: {}", chunk.len(), preview(chunk));
        }
        Ok(())
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

fn write_chunk(device: &mut dyn SerialDevice, chunk: &[u8]) -> Result<()> {
    let mut rest = chunk;
    while !rest.is_empty() {
        let n = device.write(rest)?;
        if n == 0 {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "device accepted no bytes",
            )));
        }
        rest = &rest[n.min(rest.len())..];
    }
    Ok(())
}

fn preview(bytes: &[u8]) -> String {
    if bytes.len() > TRACE_PREVIEW {
        format!("{}..", hex::encode(&bytes[..TRACE_PREVIEW]))
    } else {
        hex::encode(bytes)
    }
}

/// A caller-supplied `(offset, length)` view into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub len: usize,
}

impl Window {
    /// Validate a window against a buffer of `capacity` bytes.
    pub fn new(offset: i32, len: i32, capacity: usize) -> Result<Self> {
        if offset < 0 {
            return Err(SerialError::invalid_parameter(format!("negative offset {}", offset)));
        }
        if len < 0 {
            return Err(SerialError::invalid_parameter(format!("negative length {}", len)));
        }
        let (offset, len) = (offset as usize, len as usize);
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(Self { offset, len }),
            _ => Err(SerialError::invalid_parameter(format!(
                "window {}+{} exceeds buffer of {}",
                offset, len, capacity
            ))),
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}
