//! The shared medium every participant coordinates through.
//!
//! Models a browser-storage-like key-value space: string keys, JSON string
//! values, last-write-wins, no atomicity across keys, no delivery guarantee
//! for change events.  Consumers must stay level-triggered — react to what a
//! key currently holds, never to individual writes — and keep polling as the
//! fallback, because a `subscribe` event can be missed entirely.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort change notification.  Carries only the key; readers re-read
/// the current value.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub key: String,
}

pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Subscribe to local change events.  Lagging receivers drop events;
    /// that is fine because consumers poll anyway.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Read and deserialize a key.  Any failure — missing key, malformed JSON —
/// is `None`; a corrupt record must look exactly like an absent one.
pub fn read_json<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Option<T> {
    serde_json::from_str(&store.get(key)?).ok()
}

/// Serialize and write a key, best-effort.  Storage failures degrade
/// silently: the write simply does not take effect.
pub fn write_json<T: Serialize>(store: &dyn SharedStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => {
            if let Err(e) = store.set(key, &raw) {
                debug!("store write {} failed: {}", key, e);
            }
        }
        Err(e) => debug!("store encode {} failed: {}", key, e),
    }
}

// ── in-memory store ───────────────────────────────────────────────────────────

/// Process-local store.  Used by tests and by demos that run the console and
/// a listener inside one process.
pub struct MemStore {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("store poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value.to_string());
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().expect("store poisoned").remove(key);
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

// ── file-backed store ─────────────────────────────────────────────────────────

/// One file per key under a directory, shared between processes on the same
/// machine.  Writes are atomic (tmp + rename) so a reader never observes a
/// torn value.  Change events fire for writes made through this handle only;
/// other processes see changes via their poll loop.
pub struct FileStore {
    dir: PathBuf,
    events: broadcast::Sender<StoreEvent>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let (events, _) = broadcast::channel(64);
        Ok(Self { dir, events })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are protocol constants (plus a bounded client-id suffix);
        // keep the mapping flat and predictable.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl SharedStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
