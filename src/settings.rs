use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::AppError;
use crate::settings_keys;

/// Prefix for environment variable overrides (`GENBLOCKS_API_KEY`, ...).
pub const ENV_PREFIX: &str = "GENBLOCKS_";

/// Read-only key/value settings. Values are plaintext strings; typed helpers
/// parse on read and fall back to the supplied default.
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Trimmed, non-empty value.
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get_non_empty(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_non_empty(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => default,
            },
            None => default,
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get_non_empty(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_non_empty(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }
}

// =============================================================================
// MemorySettings
// =============================================================================

/// In-process settings, mutable through `set`.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key).is_some()
    }
}

impl SettingsProvider for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }
}

// =============================================================================
// FileSettings
// =============================================================================

/// Settings read from a flat TOML table, overridden by `GENBLOCKS_<KEY>`
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct FileSettings {
    values: HashMap<String, String>,
}

impl FileSettings {
    /// Load from `path` (if given) and apply environment overrides.
    ///
    /// A missing file is an error when the path was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    AppError::Config(format!("cannot read settings file {}: {}", p.display(), e))
                })?;
                tracing::debug!(path = %p.display(), "Loaded settings file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        Ok(settings.with_env_overrides(|name| std::env::var(name).ok()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| AppError::Config(format!("invalid settings TOML: {}", e)))?;

        let mut values = HashMap::new();
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(AppError::Config(format!(
                        "setting '{}' must be a string, number or boolean, got {}",
                        key,
                        other.type_str()
                    )))
                }
            };
            if !settings_keys::ALL.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown setting key");
            }
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    /// Apply `GENBLOCKS_<KEY>` overrides for every known key, using `lookup`
    /// to read variables.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in settings_keys::ALL {
            let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Some(value) = lookup(&var) {
                tracing::debug!(key = %key, "Setting overridden from environment");
                self.values.insert(key.to_string(), value);
            }
        }
        self
    }
}

impl SettingsProvider for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
