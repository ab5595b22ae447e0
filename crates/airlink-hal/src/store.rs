// ── Settings storage seam ──
//
// Settings persist as opaque byte blobs in host non-volatile storage.
// The host allocates slots; the core owns layout and validation of the
// bytes inside them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one stored blob within the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u16);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no data stored in slot {0}")]
    Empty(SlotId),
    #[error("stored blob is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("storage backend fault: {0}")]
    Backend(String),
}

/// Byte-blob persistence keyed by slot.
///
/// `load` must fill `buf` completely or fail; partial reads are a
/// backend fault, not a short count.
pub trait BlobStore: Send + Sync {
    fn load(&self, slot: SlotId, buf: &mut [u8]) -> Result<(), StoreError>;
    fn save(&self, slot: SlotId, bytes: &[u8]) -> Result<(), StoreError>;
}

/// In-process store, used by tests and by hosts without real flash.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<SlotId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn load(&self, slot: SlotId, buf: &mut [u8]) -> Result<(), StoreError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))?;
        let stored = slots.get(&slot).ok_or(StoreError::Empty(slot))?;
        if stored.len() != buf.len() {
            return Err(StoreError::Length {
                expected: buf.len(),
                actual: stored.len(),
            });
        }
        buf.copy_from_slice(stored);
        Ok(())
    }

    fn save(&self, slot: SlotId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))?;
        slots.insert(slot, bytes.to_vec());
        Ok(())
    }
}
