//! Typed access to runtime settings and TOML configuration files.

use crate::{AgentRuntime, ConfigError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Anything that can answer `get_setting(key)`.
pub trait SettingsSource {
    fn setting(&self, key: &str) -> Option<String>;
}

impl SettingsSource for dyn AgentRuntime {
    fn setting(&self, key: &str) -> Option<String> {
        self.get_setting(key)
    }
}

/// Process environment, with blank values treated as unset.
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn setting(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Fixed key/value settings, mostly for tests and overrides.
#[derive(Debug, Clone, Default)]
pub struct MapSettings(pub HashMap<String, String>);

impl MapSettings {
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsSource for MapSettings {
    fn setting(&self, key: &str) -> Option<String> {
        self.0.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

pub fn require<S: SettingsSource + ?Sized>(source: &S, key: &str) -> Result<String, ConfigError> {
    source
        .setting(key)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
            var_name: key.to_string(),
        })
}

pub fn optional<S: SettingsSource + ?Sized>(source: &S, key: &str) -> Option<String> {
    source.setting(key).map(|v| v.trim().to_string())
}

/// Parses an optional setting; a present but malformed value is an error.
pub fn optional_parsed<T: FromStr, S: SettingsSource + ?Sized>(
    source: &S,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match optional(source, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
            }),
    }
}

/// Like [`optional_parsed`] but rejects zero and negative numbers.
pub fn optional_positive<S: SettingsSource + ?Sized>(
    source: &S,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    match optional(source, key) {
        None => Ok(None),
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => Ok(Some(value)),
            _ => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
            }),
        },
    }
}

pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    Ok(toml::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_missing_key() {
        let settings = MapSettings::default().with("PRESENT", "yes").with("BLANK", "  ");

        assert_eq!(require(&settings, "PRESENT").unwrap(), "yes");
        match require(&settings, "BLANK") {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, "BLANK")
            }
            other => panic!("Expected missing variable, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_parsed_rejects_garbage() {
        let settings = MapSettings::default().with("N", "12").with("BAD", "twelve");

        assert_eq!(optional_parsed::<u32, _>(&settings, "N").unwrap(), Some(12));
        assert_eq!(optional_parsed::<u32, _>(&settings, "MISSING").unwrap(), None);
        assert!(optional_parsed::<u32, _>(&settings, "BAD").is_err());
    }

    #[test]
    fn test_optional_positive_rejects_zero() {
        let settings = MapSettings::default().with("ZERO", "0").with("ONE", "1");

        assert!(optional_positive(&settings, "ZERO").is_err());
        assert_eq!(optional_positive(&settings, "ONE").unwrap(), Some(1));
    }

    #[test]
    fn test_load_toml_missing_file() {
        let result: Result<HashMap<String, String>, _> =
            load_toml(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
