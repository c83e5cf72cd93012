//! Server configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `+HH:MM` / `-HH:MM`
const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Server UTC offset parses as `Z`, `UTC` or `±HH:MM`
    /// - Storage path is not empty
    ///
    /// # Example
    ///
    /// ```
    /// use weatherstation_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5500").
    pub bind: String,
    /// Offset of the station's wall clock, e.g. "+02:00".
    ///
    /// Calendar days, offset-less ingestion timestamps and returned
    /// timestamps are all interpreted in this offset.
    pub utc_offset: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5500".to_string(),
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else {
                let port_str = parts[0];
                match port_str.parse::<u16>() {
                    Ok(0) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: "port cannot be 0".to_string(),
                        });
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: format!(
                                "invalid port '{}': must be a number 1-65535",
                                port_str
                            ),
                        });
                    }
                    Ok(_) => {}
                }
            }
        }

        if parse_utc_offset(&self.utc_offset).is_none() {
            errors.push(ValidationError {
                field: "server.utc_offset".to_string(),
                message: format!(
                    "invalid UTC offset '{}': expected 'Z', 'UTC' or '+HH:MM'",
                    self.utc_offset
                ),
            });
        }

        errors
    }

    /// The configured offset.
    pub fn offset(&self) -> Result<UtcOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| {
            ConfigError::Validation(vec![ValidationError {
                field: "server.utc_offset".to_string(),
                message: format!("invalid UTC offset '{}'", self.utc_offset),
            }])
        })
    }
}

/// Parse `Z`, `UTC` or a signed `HH:MM` offset.
pub fn parse_utc_offset(value: &str) -> Option<UtcOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Some(UtcOffset::UTC);
    }
    UtcOffset::parse(value, OFFSET_FORMAT).ok()
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: weatherstation_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weatherstation")
        .join("server.toml")
}
