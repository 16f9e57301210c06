//! Persisted user settings (credential, chosen model) behind a get/set
//! contract. Read once at run start; never touched mid-run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::ProofreadError;

pub const KEY_API_KEY: &str = "api_key";
pub const KEY_MODEL: &str = "model";

/// Credentials this short are treated as missing.
pub const MIN_API_KEY_LEN: usize = 10;

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ProofreadError>;
}

/// In-process store; nothing survives a restart.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ProofreadError> {
        self.values
            .lock()
            .map_err(|_| ProofreadError::Settings("settings lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat TOML table on disk. Every `set` rewrites the file atomically.
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSettings {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(s) => toml::from_str::<BTreeMap<String, String>>(&s).unwrap_or_else(|e| {
                tracing::warn!("ignoring malformed settings file {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), ProofreadError> {
        let io = |e: std::io::Error| ProofreadError::Settings(format!("{}: {e}", self.path.display()));
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(io)?;
        }
        let body = toml::to_string(values).map_err(|e| ProofreadError::Settings(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(io)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io(e));
        }
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ProofreadError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ProofreadError::Settings("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

/// Show enough of a credential to recognize it.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MIN_API_KEY_LEN {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Accept a credential only if it is long enough to be real.
pub fn usable_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string())
        .filter(|k| k.chars().count() > MIN_API_KEY_LEN)
}
