//! Theme preference and the key-value store it lives in.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use folio_core::{SiteError, SiteResult};
use hashbrown::HashMap;
use tracing::{debug, warn};

/// Key the theme is stored under.
pub const THEME_KEY: &str = "theme";

/// Persistent string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> SiteResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SiteResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> SiteResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SiteError::storage("store lock poisoned"))
}

/// Store that forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SiteResult<Option<String>> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SiteResult<()> {
        lock(&self.values)?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store; a missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> SiteResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened key-value store");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> SiteResult<Option<String>> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SiteResult<()> {
        let mut values = lock(&self.values)?;
        values.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&*values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Colour scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl FromStr for Theme {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(SiteError::config(format!("unknown theme {other:?}"))),
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current theme plus the store it is persisted to.
pub struct ThemeController {
    store: Arc<dyn KeyValueStore>,
    current: Theme,
}

impl ThemeController {
    /// Read the stored theme, falling back to `default` when absent or unreadable.
    pub fn load(store: Arc<dyn KeyValueStore>, default: Theme) -> Self {
        let current = match store.get(THEME_KEY) {
            Ok(Some(value)) => value.parse().unwrap_or_else(|_| {
                debug!(value = %value, "Ignoring stored theme");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                warn!(error = %e, "Theme store unreadable");
                default
            }
        };

        Self { store, current }
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    /// Flip the theme and persist it.
    pub fn toggle(&mut self) -> SiteResult<Theme> {
        let next = self.current.toggled();
        self.store.set(THEME_KEY, next.as_str())?;
        self.current = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_dark() {
        let theme = ThemeController::load(Arc::new(MemoryStore::new()), Theme::default());
        assert_eq!(theme.current(), Theme::Dark);
    }

    #[test]
    fn test_toggle_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut theme = ThemeController::load(store.clone(), Theme::Dark);

        assert_eq!(theme.toggle().unwrap(), Theme::Light);
        assert_eq!(store.get(THEME_KEY).unwrap().as_deref(), Some("light"));

        let reloaded = ThemeController::load(store, Theme::Dark);
        assert_eq!(reloaded.current(), Theme::Light);
    }

    #[test]
    fn test_unknown_stored_value_falls_back() {
        let store = Arc::new(MemoryStore::new());
        store.set(THEME_KEY, "solarized").unwrap();

        let theme = ThemeController::load(store, Theme::Dark);
        assert_eq!(theme.current(), Theme::Dark);
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(THEME_KEY).unwrap(), None);
        store.set(THEME_KEY, "light").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }
}
