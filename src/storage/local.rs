//! Local cart slot implementations

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};
use crate::domain::aggregates::{Cart, CartLine};
use super::LocalCartStore;

/// Parses a stored cart. Anything unreadable is an empty cart.
fn decode(raw: &str) -> Cart {
    match serde_json::from_str::<Vec<CartLine>>(raw) {
        Ok(lines) => Cart::from_lines(lines),
        Err(e) => {
            warn!(error = %e, "discarding unreadable local cart");
            Cart::new()
        }
    }
}

fn encode(cart: &Cart) -> Option<String> {
    serde_json::to_string(cart).map_err(|e| warn!(error = %e, "failed to encode cart")).ok()
}

/// Cart slot backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCartStore {
    path: PathBuf,
}

impl FileCartStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl LocalCartStore for FileCartStore {
    fn load(&self) -> Cart {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Cart::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read local cart");
                Cart::new()
            }
        }
    }

    fn save(&self, cart: &Cart) {
        let Some(json) = encode(cart) else { return };
        // write-then-rename so a crash never leaves half a cart behind
        let tmp = self.path.with_extension("tmp");
        let result = std::fs::write(&tmp, json).and_then(|()| std::fs::rename(&tmp, &self.path));
        match result {
            Ok(()) => debug!(path = %self.path.display(), lines = cart.lines().len(), "local cart saved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to save local cart"),
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to clear local cart"),
        }
    }
}

/// In-process cart slot holding the serialized cart, as a browser storage key would.
#[derive(Debug, Default)]
pub struct MemoryCartSlot {
    raw: Mutex<Option<String>>,
}

impl MemoryCartSlot {
    pub fn new() -> Self { Self::default() }
    pub fn with_raw(raw: impl Into<String>) -> Self { Self { raw: Mutex::new(Some(raw.into())) } }
    pub fn raw(&self) -> Option<String> { self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone() }
}

impl LocalCartStore for MemoryCartSlot {
    fn load(&self) -> Cart { self.raw().as_deref().map(decode).unwrap_or_default() }

    fn save(&self, cart: &Cart) {
        if let Some(json) = encode(cart) {
            *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        }
    }

    fn clear(&self) { *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = None; }
}
