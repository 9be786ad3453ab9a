//! Persisted user settings. Only the search radius lives here.

use crate::error::{BirdError, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const SEARCH_RADIUS_KEY: &str = "searchRadius";
pub const DEFAULT_SEARCH_RADIUS: u32 = 25;

/// Integer key-value store.
pub trait SettingsStore: Send + Sync {
    fn get_int(&self, key: &str) -> Option<i64>;
    fn set_int(&self, key: &str, value: i64) -> Result<()>;

    /// Stored radius, or [`DEFAULT_SEARCH_RADIUS`] when unset or not positive.
    fn search_radius(&self) -> u32 {
        self.get_int(SEARCH_RADIUS_KEY)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SEARCH_RADIUS)
    }

    fn set_search_radius(&self, radius: u32) -> Result<()> {
        if radius == 0 {
            return Err(BirdError::Settings(
                "search radius must be positive".to_string(),
            ));
        }
        self.set_int(SEARCH_RADIUS_KEY, i64::from(radius))
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, i64>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings kept in a small JSON object on disk, rewritten on every set.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, i64>>,
}

impl JsonFileSettings {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                BirdError::Settings(format!("{} is not a settings file: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {}, starting fresh", path.display());
                HashMap::new()
            }
            Err(e) => {
                return Err(BirdError::Settings(format!(
                    "Could not read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &HashMap<String, i64>) -> Result<()> {
        let text = serde_json::to_string_pretty(values)
            .map_err(|e| BirdError::Settings(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| {
            warn!("Failed to write settings to {}: {}", self.path.display(), e);
            BirdError::Settings(e.to_string())
        })
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn set_int(&self, key: &str, value: i64) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}
