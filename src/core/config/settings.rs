//! User preferences: the flat record persisted as camelCase JSON, plus the
//! lenient field-by-field merge used on load, import and patch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

use crate::core::config::data::path_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSize {
    pub fn pixels(self) -> u32 {
        match self {
            FontSize::Small => 14,
            FontSize::Medium => 16,
            FontSize::Large => 18,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FontSize::Small => "small",
            FontSize::Medium => "medium",
            FontSize::Large => "large",
        }
    }
}

pub const DEFAULT_ALLOWED_FILE_TYPES: &[&str] = &[
    "txt", "csv", "json", "py", "js", "jsx", "ts", "tsx", "html", "css", "md", "pdf", "jpg", "png",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    pub theme: Theme,
    pub primary_color: String,
    pub accent_color: String,
    pub font_size: FontSize,

    /// Milliseconds between rendered tokens
    pub typing_speed: u64,
    pub auto_scroll: bool,
    pub sound_enabled: bool,
    pub max_history_messages: usize,
    pub auto_rename_conversations: bool,

    pub ai_model: String,
    pub temperature: f64,
    pub max_response_length: u64,
    pub preferred_language: String,

    /// Bytes
    pub max_file_size: u64,
    pub allowed_file_types: Vec<String>,
    pub auto_download_small_files: bool,
    pub download_path: String,

    pub backend_url: String,
    /// Milliseconds
    pub request_timeout: u64,
    pub debug_mode: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            username: "Usuário".to_string(),
            avatar: None,
            theme: Theme::Dark,
            primary_color: "#00d4aa".to_string(),
            accent_color: "#00b4d8".to_string(),
            font_size: FontSize::Medium,
            typing_speed: 50,
            auto_scroll: true,
            sound_enabled: false,
            max_history_messages: 100,
            auto_rename_conversations: true,
            ai_model: "llama2".to_string(),
            temperature: 0.7,
            max_response_length: 2000,
            preferred_language: "pt-BR".to_string(),
            max_file_size: 50 * 1024 * 1024,
            allowed_file_types: DEFAULT_ALLOWED_FILE_TYPES
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            auto_download_small_files: false,
            download_path: "Downloads".to_string(),
            backend_url: "http://localhost:5000".to_string(),
            request_timeout: 30_000,
            debug_mode: false,
        }
    }
}

/// Every persisted key, in display order.
pub const SETTING_KEYS: &[&str] = &[
    "username",
    "avatar",
    "theme",
    "primaryColor",
    "accentColor",
    "fontSize",
    "typingSpeed",
    "autoScroll",
    "soundEnabled",
    "maxHistoryMessages",
    "autoRenameConversations",
    "aiModel",
    "temperature",
    "maxResponseLength",
    "preferredLanguage",
    "maxFileSize",
    "allowedFileTypes",
    "autoDownloadSmallFiles",
    "downloadPath",
    "backendUrl",
    "requestTimeout",
    "debugMode",
];

#[derive(Debug)]
pub enum SettingsError {
    /// The file is not JSON, or not a JSON object.
    InvalidSettingsFile {
        path: Option<PathBuf>,
        source: Option<serde_json::Error>,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    UnknownKey(String),
    InvalidValue {
        key: String,
        value: String,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::InvalidSettingsFile { path: Some(path), .. } => {
                write!(f, "Invalid settings file: {}", path_display(path))
            }
            SettingsError::InvalidSettingsFile { path: None, .. } => {
                write!(f, "Invalid settings file")
            }
            SettingsError::Read { path, source } => {
                write!(f, "Failed to read settings at {}: {}", path_display(path), source)
            }
            SettingsError::Write { path, source } => {
                write!(f, "Failed to write settings to {}: {}", path_display(path), source)
            }
            SettingsError::UnknownKey(key) => {
                write!(f, "Unknown setting '{key}'. Known settings: {}", SETTING_KEYS.join(", "))
            }
            SettingsError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {key}: {value}")
            }
        }
    }
}

impl StdError for SettingsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SettingsError::InvalidSettingsFile { source, .. } => {
                source.as_ref().map(|err| err as &(dyn StdError + 'static))
            }
            SettingsError::Read { source, .. } | SettingsError::Write { source, .. } => Some(source),
            SettingsError::UnknownKey(_) | SettingsError::InvalidValue { .. } => None,
        }
    }
}

/// Accept `max-file-size`, `max_file_size` or `maxFileSize` and return the
/// canonical camelCase key.
pub fn canonical_key(input: &str) -> Option<&'static str> {
    let folded: String = input
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    SETTING_KEYS
        .iter()
        .find(|key| key.to_lowercase() == folded)
        .copied()
}

/// Outcome of overlaying stored values onto a base record.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub settings: UserSettings,
    /// Known keys whose values had the wrong shape and were left at the base
    pub rejected: Vec<String>,
}

impl UserSettings {
    /// Overlay `overlay` onto `self` one known key at a time. Unknown keys are
    /// ignored; a value that does not deserialize for its field keeps the
    /// base value.
    pub fn merged_with(&self, overlay: &Map<String, Value>) -> MergeOutcome {
        let mut accepted = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut rejected = Vec::new();

        for key in SETTING_KEYS {
            let Some(value) = overlay.get(*key) else {
                continue;
            };
            let mut candidate = accepted.clone();
            candidate.insert((*key).to_string(), value.clone());
            if serde_json::from_value::<UserSettings>(Value::Object(candidate)).is_ok() {
                accepted.insert((*key).to_string(), value.clone());
            } else {
                rejected.push((*key).to_string());
            }
        }

        let settings = serde_json::from_value(Value::Object(accepted)).unwrap_or_else(|err| {
            warn!(error = %err, "merged settings failed to deserialize; keeping base");
            self.clone()
        });
        MergeOutcome { settings, rejected }
    }

    /// Parse stored JSON and merge it over the defaults.
    pub fn from_json_str(contents: &str) -> Result<MergeOutcome, SettingsError> {
        let value: Value = serde_json::from_str(contents).map_err(|source| {
            SettingsError::InvalidSettingsFile {
                path: None,
                source: Some(source),
            }
        })?;
        match value {
            Value::Object(map) => Ok(UserSettings::default().merged_with(&map)),
            _ => Err(SettingsError::InvalidSettingsFile {
                path: None,
                source: None,
            }),
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get(&self, key: &str) -> Result<Value, SettingsError> {
        let canonical = canonical_key(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        Ok(value.get(canonical).cloned().unwrap_or(Value::Null))
    }

    /// Set one key from command-line text. The text is read as JSON first
    /// (`0.9`, `true`, `["txt"]`) and as a plain string otherwise.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<UserSettings, SettingsError> {
        let canonical = canonical_key(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;

        let mut candidates = Vec::with_capacity(2);
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            candidates.push(parsed);
        }
        candidates.push(Value::String(raw.to_string()));

        for candidate in candidates {
            let mut overlay = Map::new();
            overlay.insert(canonical.to_string(), candidate);
            let outcome = self.merged_with(&overlay);
            if outcome.rejected.is_empty() {
                return Ok(outcome.settings);
            }
        }

        Err(SettingsError::InvalidValue {
            key: canonical.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout.max(1))
    }

    pub fn is_file_type_allowed(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.allowed_file_types
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    }
}
