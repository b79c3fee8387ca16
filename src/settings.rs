//! Persistent key/value settings.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

pub const API_BASE_URL_KEY: &str = "API_BASE_URL";
pub const DEFAULT_SETTINGS_PATH: &str = "~/.config/wordsearch/settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot expand path {0}")]
    Expand(String),
}

pub trait SettingsStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// Settings kept in a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let items = match load_items(&path) {
            Ok(items) => items,
            Err(error @ SettingsError::Parse { .. }) => {
                warn!("Ignoring unreadable settings: {error}");
                BTreeMap::new()
            }
            Err(error) => return Err(error),
        };
        debug!("Opened settings {} with {} entries", path.display(), items.len());
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    /// Opens a store from a user supplied path such as `~/.config/...`.
    pub fn open_expanded(raw: &str) -> Result<Self, SettingsError> {
        Self::open(expand_path(raw)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let payload = serde_json::to_string_pretty(items).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload).map_err(write_err)?;
        fs::rename(&staging, &self.path).map_err(write_err)
    }
}

impl SettingsStore for JsonFileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }
}

/// Settings that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl SettingsStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn expand_path(raw: &str) -> Result<PathBuf, SettingsError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|error| SettingsError::Expand(format!("{raw}: {error}")))
}

fn load_items(path: &Path) -> Result<BTreeMap<String, String>, SettingsError> {
    let payload = match fs::read_to_string(path) {
        Ok(payload) => payload,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&payload).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
