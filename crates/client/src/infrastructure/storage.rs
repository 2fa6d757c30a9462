//! Session storage adapters
//!
//! Both adapters are read-only from this crate's side: the host signs users
//! in and writes the session. `FileSessionStore` reads key/value pairs from a
//! JSON file at:
//! - Linux: ~/.config/scenesync/storage.json
//! - macOS: ~/Library/Application Support/io.scenesync.scenesync/storage.json
//! - Windows: C:\Users\<User>\AppData\Roaming\scenesync\scenesync\config\storage.json

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use directories::ProjectDirs;

use crate::ports::outbound::SessionStore;

/// File-backed session store with an in-memory cache.
#[derive(Clone)]
pub struct FileSessionStore {
    storage_path: PathBuf,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl FileSessionStore {
    /// Store in the platform config directory.
    pub fn default_location() -> Self {
        let storage_path = match ProjectDirs::from("io", "scenesync", "scenesync") {
            Some(dirs) => dirs.config_dir().join("storage.json"),
            // Fallback to current directory if project dirs unavailable
            None => PathBuf::from("scenesync_storage.json"),
        };
        Self::at_path(storage_path)
    }

    /// Store at `path`, loading existing data if the file exists.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let storage_path = path.into();
        let cache = load_map(&storage_path);
        tracing::debug!(path = %storage_path.display(), entries = cache.len(), "Session storage initialized");

        Self {
            storage_path,
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.cache.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire read lock for storage");
                None
            }
        }
    }
}

fn load_map(path: &Path) -> HashMap<String, String> {
    if !path.exists() {
        return HashMap::new();
    }
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<HashMap<String, String>>(&data) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse storage file");
                HashMap::new()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read storage file");
            HashMap::new()
        }
    }
}

/// Process-local session store, for headless runs and tests.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut guard) = self.values.write() {
            guard.insert(key.into(), value.into());
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}
