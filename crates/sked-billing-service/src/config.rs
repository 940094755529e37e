//! Engine configuration.
//!
//! Settings come from three layers, highest first: an optional JSON file
//! named by `SKED_BILLING_CONFIG`, individual environment variables, and
//! built-in defaults.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sked_billing_core::Currency;

use crate::error::{EngineError, Result};

/// Environment variable naming the JSON settings file.
pub const CONFIG_FILE_VAR: &str = "SKED_BILLING_CONFIG";

const DEFAULT_DATA_DIR: &str = "/data/sked-billing";
const DEFAULT_RUN_INTERVAL_SECONDS: u64 = 3600;
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path to `RocksDB` data directory (default: "/data/sked-billing").
    pub data_dir: String,

    /// Seconds between scheduled billing runs (default: 3600).
    pub run_interval_seconds: u64,

    /// Retries after a version conflict before an operation gives up (default: 3).
    pub max_conflict_retries: u32,

    /// Currency of newly opened tenant cycles (default: EUR).
    pub currency: Currency,
}

/// Contents of the settings file. Every key is optional; unknown keys are
/// rejected so a misspelt setting does not silently fall through.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    data_dir: Option<String>,
    run_interval_seconds: Option<u64>,
    max_conflict_retries: Option<u32>,
    currency: Option<Currency>,
}

impl SettingsFile {
    /// Read the file at `path`.
    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            EngineError::Configuration(format!("invalid settings in {}: {e}", path.display()))
        })
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` when the settings file cannot be
    /// read or parsed, and for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let file = match env(CONFIG_FILE_VAR) {
            Some(path) => {
                let file = SettingsFile::read(Path::new(&path))?;
                tracing::info!(path = %path, "Loaded billing settings file");
                file
            }
            None => {
                tracing::debug!("{CONFIG_FILE_VAR} not set, using environment variables");
                SettingsFile::default()
            }
        };
        Self::resolve(env, file)
    }

    fn resolve(env: impl Fn(&str) -> Option<String>, file: SettingsFile) -> Result<Self> {
        let data_dir = file
            .data_dir
            .or_else(|| env("DATA_DIR"))
            .unwrap_or_else(|| DEFAULT_DATA_DIR.into());

        let run_interval_seconds = match file.run_interval_seconds {
            Some(seconds) => seconds,
            None => parse_var(&env, "RUN_INTERVAL_SECONDS")?.unwrap_or(DEFAULT_RUN_INTERVAL_SECONDS),
        };
        if run_interval_seconds == 0 {
            return Err(EngineError::Configuration(
                "run interval must be at least one second".into(),
            ));
        }

        let max_conflict_retries = match file.max_conflict_retries {
            Some(retries) => retries,
            None => parse_var(&env, "MAX_CONFLICT_RETRIES")?.unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES),
        };

        let currency = match (file.currency, env("BILLING_CURRENCY")) {
            (Some(currency), _) => currency,
            (None, Some(code)) => Currency::from_str(&code)
                .map_err(|e| EngineError::Configuration(e.to_string()))?,
            (None, None) => Currency::Eur,
        };

        Ok(Self {
            data_dir,
            run_interval_seconds,
            max_conflict_retries,
            currency,
        })
    }
}

fn parse_var<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| EngineError::Configuration(format!("{key}={raw:?} is not a valid number")))
        })
        .transpose()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.into(),
            run_interval_seconds: DEFAULT_RUN_INTERVAL_SECONDS,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            currency: Currency::Eur,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::resolve(env_of(&[]), SettingsFile::default()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let env = env_of(&[
            ("DATA_DIR", "/tmp/billing"),
            ("RUN_INTERVAL_SECONDS", "60"),
            ("MAX_CONFLICT_RETRIES", "5"),
            ("BILLING_CURRENCY", "usd"),
        ]);
        let config = EngineConfig::resolve(env, SettingsFile::default()).unwrap();

        assert_eq!(config.data_dir, "/tmp/billing");
        assert_eq!(config.run_interval_seconds, 60);
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.currency, Currency::Usd);
    }

    #[test]
    fn file_overrides_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billing.json");
        std::fs::write(&path, r#"{ "run_interval_seconds": 900, "currency": "GBP" }"#).unwrap();

        let env = env_of(&[("RUN_INTERVAL_SECONDS", "60"), ("BILLING_CURRENCY", "USD")]);
        let config = EngineConfig::resolve(env, SettingsFile::read(&path).unwrap()).unwrap();

        assert_eq!(config.run_interval_seconds, 900);
        assert_eq!(config.currency, Currency::Gbp);
        assert_eq!(config.data_dir, DEFAULT_DATA_DIR);
    }

    #[test]
    fn broken_settings_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = SettingsFile::read(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(EngineError::Configuration(_))));

        let misspelt = dir.path().join("misspelt.json");
        std::fs::write(&misspelt, r#"{ "run_interval_secs": 900 }"#).unwrap();
        assert!(matches!(
            SettingsFile::read(&misspelt),
            Err(EngineError::Configuration(_))
        ));

        let bad_currency = dir.path().join("currency.json");
        std::fs::write(&bad_currency, r#"{ "currency": "XYZ" }"#).unwrap();
        assert!(matches!(
            SettingsFile::read(&bad_currency),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_number = EngineConfig::resolve(
            env_of(&[("MAX_CONFLICT_RETRIES", "many")]),
            SettingsFile::default(),
        );
        assert!(matches!(bad_number, Err(EngineError::Configuration(_))));

        let zero_interval = EngineConfig::resolve(
            env_of(&[("RUN_INTERVAL_SECONDS", "0")]),
            SettingsFile::default(),
        );
        assert!(matches!(zero_interval, Err(EngineError::Configuration(_))));

        let bad_currency = EngineConfig::resolve(
            env_of(&[("BILLING_CURRENCY", "XYZ")]),
            SettingsFile::default(),
        );
        assert!(matches!(bad_currency, Err(EngineError::Configuration(_))));
    }
}
