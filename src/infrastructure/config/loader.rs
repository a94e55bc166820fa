use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{Config, RuleBook};
use crate::services::business_calendar::parse_weekday;

/// Project directory holding config, rules and the database.
pub const PROJECT_DIR: &str = ".harmony";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid notification max_attempts: {0}. Must be at least 1")]
    InvalidNotificationAttempts(u32),

    #[error("Invalid business hours: open {open}:00, close {close}:00")]
    InvalidBusinessHours { open: u32, close: u32 },

    #[error("Unknown workday: {0}")]
    InvalidWorkday(String),

    #[error("Invalid UTC offset: {0} minutes")]
    InvalidUtcOffset(i32),

    #[error("Invalid event_channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .harmony/config.yaml (project config, created by init)
    /// 3. .harmony/local.yaml (project local overrides, optional)
    /// 4. Environment variables (HARMONY_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Load configuration for the project rooted at `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let project = root.as_ref().join(PROJECT_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project.join("config.yaml")))
            .merge(Yaml::file(project.join("local.yaml")))
            .merge(Env::prefixed("HARMONY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load the rule table named by `rules_path`, or the embedded one.
    pub fn load_rules(config: &Config) -> Result<RuleBook> {
        let rules = match &config.rules_path {
            Some(path) => RuleBook::load(path).context(format!("Failed to load rules from {path}"))?,
            None => RuleBook::builtin().context("Embedded rule table is invalid")?,
        };
        Ok(rules)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        let retry = &config.persistence;
        if retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(retry.max_retries));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }

        if config.notifications.max_attempts == 0 {
            return Err(ConfigError::InvalidNotificationAttempts(
                config.notifications.max_attempts,
            ));
        }
        if config.notifications.channel.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "notification channel cannot be empty".to_string(),
            ));
        }

        if config.engine.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                config.engine.event_channel_capacity,
            ));
        }

        let hours = &config.business_hours;
        if hours.open_hour >= hours.close_hour || hours.close_hour > 24 {
            return Err(ConfigError::InvalidBusinessHours {
                open: hours.open_hour,
                close: hours.close_hour,
            });
        }
        if hours.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ConfigError::InvalidUtcOffset(hours.utc_offset_minutes));
        }
        if let Some(day) = hours.workdays.iter().find(|d| parse_weekday(d).is_none()) {
            return Err(ConfigError::InvalidWorkday(day.clone()));
        }
        if hours.enabled && hours.workdays.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "business hours are enabled but no workdays are configured".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_project_file(root: &Path, name: &str, body: &str) {
        let dir = root.join(PROJECT_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".harmony/harmony.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.max_replans, 2);
        assert_eq!(config.notifications.max_attempts, 3);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: pretty
engine:
  max_replans: 4
  replan_coalesce_ms: 500
business_hours:
  open_hour: 8
  close_hour: 18
  workdays: [mon, tue, wed]
vip_contacts:
  - ceo@example.com
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.engine.max_replans, 4);
        assert_eq!(config.engine.replan_coalesce_ms, 500);
        assert_eq!(config.engine.context_lookup_timeout_ms, 500);
        assert_eq!(config.business_hours.workdays.len(), 3);
        assert_eq!(config.vip_contacts, vec!["ceo@example.com"]);
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.persistence.initial_backoff_ms = 30_000;
        config.persistence.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_zero_max_retries() {
        let mut config = Config::default();
        config.persistence.max_retries = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxRetries(0)
        ));
    }

    #[test]
    fn test_validate_zero_notification_attempts() {
        let mut config = Config::default();
        config.notifications.max_attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidNotificationAttempts(0)
        ));
    }

    #[test]
    fn test_validate_inverted_business_hours() {
        let mut config = Config::default();
        config.business_hours.open_hour = 18;
        config.business_hours.close_hour = 9;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBusinessHours { open: 18, close: 9 }
        ));
    }

    #[test]
    fn test_validate_unknown_workday() {
        let mut config = Config::default();
        config.business_hours.workdays = vec!["mon".into(), "funday".into()];
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidWorkday(day) => assert_eq!(day, "funday"),
            other => panic!("Expected InvalidWorkday error, got {other:?}"),
        }
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = tempfile::tempdir().unwrap();
        write_project_file(
            dir.path(),
            "config.yaml",
            "logging:\n  level: info\n  format: json\nengine:\n  max_replans: 3\n",
        );
        write_project_file(dir.path(), "local.yaml", "logging:\n  level: debug\n");

        let config = temp_env::with_vars_unset(["HARMONY_LOGGING__LEVEL"], || {
            ConfigLoader::load_from_dir(dir.path()).unwrap()
        });

        assert_eq!(config.logging.level, "debug", "Local override should win");
        assert_eq!(config.logging.format, "json", "Base value should persist");
        assert_eq!(config.engine.max_replans, 3);
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        write_project_file(dir.path(), "config.yaml", "engine:\n  max_replans: 3\n");

        let config = temp_env::with_vars(
            [
                ("HARMONY_ENGINE__MAX_REPLANS", Some("5")),
                ("HARMONY_LOGGING__LEVEL", Some("warn")),
            ],
            || ConfigLoader::load_from_dir(dir.path()).unwrap(),
        );

        assert_eq!(config.engine.max_replans, 5);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = temp_env::with_var("HARMONY_LOGGING__FORMAT", Some("xml"), || {
            ConfigLoader::load_from_dir(dir.path())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rules_defaults_to_builtin() {
        let rules = ConfigLoader::load_rules(&Config::default()).unwrap();
        rules.validate().unwrap();
    }

    #[test]
    fn test_load_rules_missing_file_fails() {
        let config = Config {
            rules_path: Some("/nonexistent/rules.yaml".to_string()),
            ..Config::default()
        };
        assert!(ConfigLoader::load_rules(&config).is_err());
    }
}
