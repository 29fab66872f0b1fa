use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::ReminderChannel;
use crate::escalation::EscalationSettings;

pub const CONFIG_PATH_ENV: &str = "SIGNOFF_CONFIG";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub definitions: DefinitionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
    pub reminder_cadence_hours: i64,
    pub reminder_channels: Vec<ReminderChannel>,
}

impl SchedulerConfig {
    pub fn escalation_settings(&self) -> EscalationSettings {
        EscalationSettings {
            sweep_interval_secs: self.sweep_interval_secs,
            reminder_cadence_hours: self.reminder_cadence_hours,
            reminder_channels: self.reminder_channels.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DefinitionsConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    scheduler: RawScheduler,
    #[serde(default)]
    definitions: RawDefinitions,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawServer {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawScheduler {
    sweep_interval_secs: Option<u64>,
    reminder_cadence_hours: Option<i64>,
    reminder_channels: Option<Vec<ReminderChannel>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawDefinitions {
    path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Loads the TOML config (path from `options` or `SIGNOFF_CONFIG`),
    /// applies environment overrides, and validates. A missing file is
    /// fine unless `require_file` is set: everything has a default.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let path = options
            .config_path
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let raw = match &path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
                toml::from_str::<RawConfig>(&contents)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?
            }
            Some(path) if options.require_file => {
                return Err(ConfigError::MissingConfigFile(path.clone()));
            }
            _ => RawConfig::default(),
        };

        let config = Self {
            server: ServerConfig {
                bind_address: env_or("SIGNOFF_BIND_ADDRESS", raw.server.bind_address)
                    .unwrap_or_else(|| "127.0.0.1".to_string()),
                port: env_parsed("SIGNOFF_PORT", raw.server.port)?.unwrap_or(8080),
            },
            scheduler: SchedulerConfig {
                sweep_interval_secs: env_parsed(
                    "SIGNOFF_SWEEP_INTERVAL_SECS",
                    raw.scheduler.sweep_interval_secs,
                )?
                .unwrap_or(60),
                reminder_cadence_hours: env_parsed(
                    "SIGNOFF_REMINDER_CADENCE_HOURS",
                    raw.scheduler.reminder_cadence_hours,
                )?
                .unwrap_or(24),
                reminder_channels: raw
                    .scheduler
                    .reminder_channels
                    .unwrap_or_else(|| vec![ReminderChannel::Email]),
            },
            definitions: DefinitionsConfig {
                path: env_or("SIGNOFF_DEFINITIONS_PATH", raw.definitions.path.map(path_string))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("definitions.toml")),
            },
            logging: LoggingConfig {
                level: env_or("SIGNOFF_LOG_LEVEL", raw.logging.level)
                    .unwrap_or_else(|| "info".to_string()),
                format: raw.logging.format.unwrap_or(LogFormat::Compact),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.scheduler.reminder_cadence_hours <= 0 {
            return Err(ConfigError::Invalid(
                "scheduler.reminder_cadence_hours must be positive".to_string(),
            ));
        }
        if self.scheduler.reminder_channels.is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler.reminder_channels must not be empty".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind_address must not be blank".to_string()));
        }
        Ok(())
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty()).or(fallback)
}

fn env_parsed<T>(key: &str, fallback: Option<T>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidEnvOverride { key: key.to_string(), value }
        }),
        _ => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, LoadOptions, LogFormat};

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config = AppConfig::load(LoadOptions::default()).expect("defaults");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scheduler.sweep_interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
[server]
bind_address = "0.0.0.0"
port = 9000

[scheduler]
sweep_interval_secs = 15
reminder_cadence_hours = 6

[logging]
level = "debug"
format = "json"
"#,
        );

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
        })
        .expect("config should load");

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.scheduler.sweep_interval_secs, 15);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn malformed_files_surface_a_parse_error() {
        let file = write_config("[server\nport = nine thousand");

        let error = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
        })
        .expect_err("parse should fail");

        assert!(matches!(error, ConfigError::ParseFile { .. }));
    }

    #[test]
    fn zero_sweep_interval_fails_validation() {
        let file = write_config("[scheduler]\nsweep_interval_secs = 0\n");

        let error = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
        })
        .expect_err("validation should fail");

        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("/definitely/not/here.toml".into()),
            require_file: true,
        })
        .expect_err("missing file");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
