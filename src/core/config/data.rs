use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STORE_URL_ENV: &str = "OLLAMACODE_STORE_URL";
pub const STORE_KEY_ENV: &str = "OLLAMACODE_STORE_KEY";
pub const BACKEND_URL_ENV: &str = "OLLAMACODE_BACKEND_URL";
pub const NO_KEYRING_ENV: &str = "OLLAMACODE_NO_KEYRING";

pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 10;

/// Connection details for the hosted store (REST, storage and auth surfaces).
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: Option<String>,
    /// Public anonymous API key sent as `apikey`
    pub anon_key: Option<String>,
}

/// Application config read from `config.toml`. User-facing preferences live
/// in the separate settings file; this only holds deployment wiring.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    /// Overrides the `backendUrl` user setting when present
    pub backend_url: Option<String>,
    /// Seconds between backend health checks
    pub health_interval_secs: Option<u64>,
    /// Location of the settings JSON file
    pub settings_path: Option<PathBuf>,
    /// Store refresh tokens in the OS keyring (default on)
    pub use_keyring: Option<bool>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/ollamacode/config.toml` → `~/.config/ollamacode/config.toml`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(
            self.health_interval_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS),
        )
    }

    pub fn keyring_enabled(&self) -> bool {
        self.use_keyring.unwrap_or(true)
    }

    /// Apply environment overrides through `lookup`, which is `std::env::var`
    /// outside of tests.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(STORE_URL_ENV) {
            self.store.url = Some(url);
        }
        if let Some(key) = non_empty(STORE_KEY_ENV) {
            self.store.anon_key = Some(key);
        }
        if let Some(url) = non_empty(BACKEND_URL_ENV) {
            self.backend_url = Some(url);
        }
        if let Some(flag) = non_empty(NO_KEYRING_ENV) {
            if matches!(flag.trim(), "1" | "true" | "yes" | "on") {
                self.use_keyring = Some(false);
            }
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }
}
