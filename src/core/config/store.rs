use crate::core::config::io::write_atomic;
use crate::core::config::settings::{SettingsError, UserSettings};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub const EXPORT_FILE_PREFIX: &str = "ollamacode-settings";

/// File-backed settings with an in-memory copy. Every mutation is written
/// through before it becomes visible.
pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<Option<UserSettings>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<UserSettings>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the file, falling back to defaults when it is missing or corrupt.
    fn read_from_disk(&self) -> UserSettings {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file; using defaults");
                return UserSettings::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read settings; using defaults");
                return UserSettings::default();
            }
        };

        match UserSettings::from_json_str(&contents) {
            Ok(outcome) => {
                if !outcome.rejected.is_empty() {
                    warn!(keys = ?outcome.rejected, "ignoring settings with invalid values");
                }
                outcome.settings
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt settings file; using defaults");
                UserSettings::default()
            }
        }
    }

    /// `debugMode` as written on disk, read without logging so it can pick
    /// the log level before diagnostics are installed. Anything unreadable
    /// counts as off.
    pub fn peek_debug_mode(&self) -> bool {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Value>(&contents).ok())
            .and_then(|value| value.get("debugMode").and_then(Value::as_bool))
            .unwrap_or(false)
    }

    pub fn load(&self) -> UserSettings {
        let mut state = self.lock();
        if let Some(settings) = state.as_ref() {
            return settings.clone();
        }
        let settings = self.read_from_disk();
        *state = Some(settings.clone());
        settings
    }

    fn persist_locked(
        &self,
        state: &mut MutexGuard<'_, Option<UserSettings>>,
        settings: UserSettings,
    ) -> Result<UserSettings, SettingsError> {
        write_atomic(&self.path, settings.to_json_pretty().as_bytes()).map_err(|source| {
            SettingsError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        **state = Some(settings.clone());
        Ok(settings)
    }

    fn mutate<F>(&self, mutator: F) -> Result<UserSettings, SettingsError>
    where
        F: FnOnce(&UserSettings) -> Result<UserSettings, SettingsError>,
    {
        let mut state = self.lock();
        let current = match state.as_ref() {
            Some(settings) => settings.clone(),
            None => self.read_from_disk(),
        };
        let updated = mutator(&current)?;
        self.persist_locked(&mut state, updated)
    }

    /// Merge a partial JSON object into the current settings.
    pub fn update(&self, patch: &Map<String, Value>) -> Result<UserSettings, SettingsError> {
        self.mutate(|current| {
            let outcome = current.merged_with(patch);
            if !outcome.rejected.is_empty() {
                warn!(keys = ?outcome.rejected, "ignoring patched settings with invalid values");
            }
            Ok(outcome.settings)
        })
    }

    pub fn set(&self, key: &str, raw: &str) -> Result<UserSettings, SettingsError> {
        self.mutate(|current| current.with_value(key, raw))
    }

    pub fn reset(&self) -> Result<UserSettings, SettingsError> {
        self.mutate(|_| Ok(UserSettings::default()))
    }

    /// Replace settings with the contents of `source`, merged over the
    /// defaults. Current settings are untouched on any error.
    pub fn import_file(&self, source: &Path) -> Result<UserSettings, SettingsError> {
        let contents = fs::read_to_string(source).map_err(|err| SettingsError::Read {
            path: source.to_path_buf(),
            source: err,
        })?;
        let outcome = UserSettings::from_json_str(&contents).map_err(|err| match err {
            SettingsError::InvalidSettingsFile { source: json, .. } => {
                SettingsError::InvalidSettingsFile {
                    path: Some(source.to_path_buf()),
                    source: json,
                }
            }
            other => other,
        })?;
        if !outcome.rejected.is_empty() {
            warn!(keys = ?outcome.rejected, "imported settings had invalid values; defaults kept");
        }
        self.mutate(|_| Ok(outcome.settings))
    }

    /// Write the current settings to `ollamacode-settings-YYYY-MM-DD.json`
    /// inside `dir` and return the file path.
    pub fn export_to_dir(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf, SettingsError> {
        let settings = self.load();
        let target = dir.join(export_file_name(date));
        write_atomic(&target, settings.to_json_pretty().as_bytes()).map_err(|source| {
            SettingsError::Write {
                path: target.clone(),
                source,
            }
        })?;
        Ok(target)
    }
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("{EXPORT_FILE_PREFIX}-{}.json", date.format("%Y-%m-%d"))
}
