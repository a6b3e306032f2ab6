//! Engine configuration.
//!
//! # Responsibility
//! - Parse engine settings from JSON with every field defaulted.
//! - Reject settings the engine cannot honor before any database work.
//!
//! # Invariants
//! - A validated config has a non-blank default stock sheet and task title.
//! - `log_dir`, when present, is absolute.

use crate::logging::{init_logging, LogLevel, LoggingError};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_STOCK_SHEET: &str = "Pantry";
pub const DEFAULT_TASK_TITLE: &str = crate::repo::schedule_repo::DEFAULT_TASK_TITLE;

/// Configuration loading or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings shared by the reconciliation services.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// Sheet used when a purchase does not name one.
    pub default_stock_sheet: String,
    /// Whether purchases create stock items unless the input opts out.
    pub stock_from_purchases: bool,
    pub scheduler_task_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::build_default().as_str().to_string(),
            log_dir: None,
            default_stock_sheet: DEFAULT_STOCK_SHEET.to_string(),
            stock_from_purchases: true,
            scheduler_task_title: DEFAULT_TASK_TITLE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        LogLevel::parse(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.default_stock_sheet.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_stock_sheet cannot be blank".to_string(),
            ));
        }
        if self.scheduler_task_title.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler_task_title cannot be blank".to_string(),
            ));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Starts file logging when `log_dir` is configured.
    ///
    /// Returns `Ok(false)` when no directory is set.
    pub fn init_logging(&self) -> Result<bool, LoggingError> {
        let Some(dir) = &self.log_dir else {
            return Ok(false);
        };
        init_logging(&self.log_level, dir)?;
        Ok(true)
    }
}
