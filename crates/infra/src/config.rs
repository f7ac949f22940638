//! Engine configuration from environment variables.
//!
//! | variable                        | default            |
//! |---------------------------------|--------------------|
//! | `HRGATE_SIMULATION_DEADLINE_MS` | `5000`             |
//! | `HRGATE_SESSION_TTL_SECS`       | `3600`             |
//! | `HRGATE_LOG_FORMAT`             | `json`             |
//! | `HRGATE_MODULES`                | built-in HR list   |

use std::time::Duration;

use thiserror::Error;

use hrgate_auth::{ModuleCatalog, ModuleKey};
use hrgate_observability::LogFormat;

pub const SIMULATION_DEADLINE_MS: &str = "HRGATE_SIMULATION_DEADLINE_MS";
pub const SESSION_TTL_SECS: &str = "HRGATE_SESSION_TTL_SECS";
pub const LOG_FORMAT: &str = "HRGATE_LOG_FORMAT";
pub const MODULES: &str = "HRGATE_MODULES";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {key}: '{value}' ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub simulation_deadline: Duration,
    pub session_ttl: Duration,
    pub log_format: LogFormat,
    pub modules: ModuleCatalog,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulation_deadline: Duration::from_millis(5_000),
            session_ttl: Duration::from_secs(3_600),
            log_format: LogFormat::Json,
            modules: ModuleCatalog::hr_default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Absent or blank values use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(SIMULATION_DEADLINE_MS) {
            config.simulation_deadline = Duration::from_millis(positive(SIMULATION_DEADLINE_MS, &raw)?);
        }
        if let Some(raw) = get(SESSION_TTL_SECS) {
            config.session_ttl = Duration::from_secs(positive(SESSION_TTL_SECS, &raw)?);
        }
        if let Some(raw) = get(LOG_FORMAT) {
            config.log_format = raw.parse().map_err(|e: hrgate_observability::ParseLogFormatError| ConfigError {
                key: LOG_FORMAT,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(raw) = get(MODULES) {
            let modules: Vec<ModuleKey> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(|m| ModuleKey::from(m.to_string()))
                .collect();
            if modules.is_empty() {
                return Err(ConfigError {
                    key: MODULES,
                    value: raw,
                    reason: "no module keys".to_string(),
                });
            }
            config.modules = ModuleCatalog::new(modules);
        }

        Ok(config)
    }
}

fn positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero")),
        Ok(v) => Ok(v),
        Err(_) => Err(invalid("not a whole number")),
    }
}
