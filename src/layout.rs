// Dashboard layout persistence, independent of the arrival pipeline

use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// Opaque key/value capability. `set` reports whether the value was stored.
pub trait LayoutStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn set(&self, key: &str, value: Bytes) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayoutStore for MemoryLayoutStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Bytes) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        true
    }
}

/// One file per key inside a directory.
#[derive(Debug)]
pub struct FileLayoutStore {
    dir: PathBuf,
}

impl FileLayoutStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileLayoutStore { dir: dir.into() }
    }

    /// `<cache dir>/subway_board`, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("subway_board");
        path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl LayoutStore for FileLayoutStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        let path = self.key_path(key);
        match fs::read(&path) {
            Ok(contents) => Some(Bytes::from(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read layout");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Bytes) -> bool {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!(dir = %self.dir.display(), error = %e, "Failed to create layout directory");
            return false;
        }
        let path = self.key_path(key);
        match fs::write(&path, &value) {
            Ok(()) => {
                info!(path = %path.display(), bytes = value.len(), "Layout saved");
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write layout");
                false
            }
        }
    }
}
