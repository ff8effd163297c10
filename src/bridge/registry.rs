use std::sync::{Arc, Mutex, MutexGuard};

use crate::serial::{Port, Result, SerialError};

/// Opaque handle token. `0` is never issued and stands for "no handle".
pub type Token = u64;

pub const NULL_TOKEN: Token = 0;

struct Slot {
    generation: u32,
    port: Option<Arc<Port>>,
}

/// Arena of open ports addressed by generation-checked tokens.
///
/// A token encodes a slot index and the generation the slot had when the
/// port was stored. Reusing a slot bumps its generation, so a stale token
/// (or one that was never issued) is rejected instead of reaching another
/// caller's port.
#[derive(Default)]
pub struct HandleRegistry {
    slots: Mutex<Vec<Slot>>,
}

fn encode(index: usize, generation: u32) -> Token {
    ((generation as u64) << 32) | (index as u64 + 1)
}

fn decode(token: Token) -> Option<(usize, u32)> {
    let low = token & 0xFFFF_FFFF;
    if low == 0 {
        return None;
    }
    Some(((low - 1) as usize, (token >> 32) as u32))
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, port: Port) -> Token {
        let port = Some(Arc::new(port));
        let mut slots = self.slots();

        if let Some(index) = slots.iter().position(|s| s.port.is_none()) {
            let slot = &mut slots[index];
            slot.generation = next_generation(slot.generation);
            slot.port = port;
            return encode(index, slot.generation);
        }

        slots.push(Slot { generation: 1, port });
        encode(slots.len() - 1, 1)
    }

    pub fn get(&self, token: Token) -> Result<Arc<Port>> {
        let (index, generation) = decode(token).ok_or(SerialError::InvalidHandle)?;
        let slots = self.slots();
        match slots.get(index) {
            Some(Slot { generation: g, port: Some(port) }) if *g == generation => Ok(port.clone()),
            _ => Err(SerialError::InvalidHandle),
        }
    }

    /// Detach the port from its token. The token is dead from here on.
    pub fn remove(&self, token: Token) -> Result<Arc<Port>> {
        let (index, generation) = decode(token).ok_or(SerialError::InvalidHandle)?;
        let mut slots = self.slots();
        match slots.get_mut(index) {
            Some(slot) if slot.generation == generation && slot.port.is_some() => {
                slot.port.take().ok_or(SerialError::InvalidHandle)
            }
            _ => Err(SerialError::InvalidHandle),
        }
    }

    pub fn len(&self) -> usize {
        self.slots().iter().filter(|s| s.port.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        g => g,
    }
}
