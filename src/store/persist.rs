//! Local persistence of the view-state slice and quest summaries.
//!
//! The live graph is never written here; it comes back from the backend.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::PersistError;
use crate::geometry::ViewState;
use crate::model::QuestSummary;

pub const VIEW_STATE_KEY: &str = "view_state";
pub const QUEST_SUMMARIES_KEY: &str = "quest_summaries";

/// Keyed string storage
pub trait LocalStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn save(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

fn check_key(key: &str) -> Result<(), PersistError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PersistError::InvalidKey(key.to_string()))
    }
}

/// One `<key>.json` file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, PersistError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl LocalStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path(key)?;
        // write-then-rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        debug!(key, path = %path.display(), "persisted");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage for tests and headless sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        check_key(key)?;
        Ok(self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistError> {
        check_key(key)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        check_key(key)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }
}

pub fn load_json<T: DeserializeOwned>(storage: &dyn LocalStorage, key: &str) -> Result<Option<T>, PersistError> {
    match storage.load(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(storage: &dyn LocalStorage, key: &str, value: &T) -> Result<(), PersistError> {
    let text = serde_json::to_string_pretty(value)?;
    storage.save(key, &text)
}

/// What survives between sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub view_state: Option<ViewState>,
    pub quests: Vec<QuestSummary>,
}

impl PersistedState {
    /// Load both slices; unreadable or corrupt entries fall back to empty
    pub fn load(storage: &dyn LocalStorage) -> Self {
        let view_state = load_json(storage, VIEW_STATE_KEY).unwrap_or_else(|e| {
            warn!(key = VIEW_STATE_KEY, error = %e, "ignoring persisted view state");
            None
        });
        let quests = load_json(storage, QUEST_SUMMARIES_KEY)
            .unwrap_or_else(|e| {
                warn!(key = QUEST_SUMMARIES_KEY, error = %e, "ignoring persisted quest list");
                None
            })
            .unwrap_or_default();
        Self { view_state, quests }
    }

    pub fn save_view_state(storage: &dyn LocalStorage, view: &ViewState) -> Result<(), PersistError> {
        save_json(storage, VIEW_STATE_KEY, view)
    }

    pub fn save_quests(storage: &dyn LocalStorage, quests: &[QuestSummary]) -> Result<(), PersistError> {
        save_json(storage, QUEST_SUMMARIES_KEY, quests)
    }
}
