use serde::{Deserialize, Serialize};

/// Main configuration structure for Harmony
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Record Store write retry policy
    #[serde(default)]
    pub persistence: RetryConfig,

    /// Human-operator notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Business calendar used by low/medium SLA clocks
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,

    /// External rule table; the embedded table is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,

    /// Contacts flagged as VIP for priority raising
    #[serde(default)]
    pub vip_contacts: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".harmony/harmony.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Replans allowed per request before escalating
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Failures reported within this window are handled by one replan
    #[serde(default = "default_replan_coalesce_ms")]
    pub replan_coalesce_ms: u64,

    /// Business-context lookups slower than this are treated as failed
    #[serde(default = "default_context_lookup_timeout_ms")]
    pub context_lookup_timeout_ms: u64,

    /// Prior escalations at which a contact's priority is raised
    #[serde(default = "default_repeat_escalation_threshold")]
    pub repeat_escalation_threshold: u32,

    /// Broadcast capacity of the lifecycle event bus
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Finished requests whose final view stays queryable after they leave
    /// the live table
    #[serde(default = "default_retained_settled")]
    pub retained_settled: usize,
}

const fn default_max_replans() -> u32 {
    2
}

const fn default_replan_coalesce_ms() -> u64 {
    2_000
}

const fn default_context_lookup_timeout_ms() -> u64 {
    500
}

const fn default_repeat_escalation_threshold() -> u32 {
    1
}

const fn default_event_channel_capacity() -> usize {
    1024
}

const fn default_retained_settled() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            replan_coalesce_ms: default_replan_coalesce_ms(),
            context_lookup_timeout_ms: default_context_lookup_timeout_ms(),
            repeat_escalation_threshold: default_repeat_escalation_threshold(),
            event_channel_capacity: default_event_channel_capacity(),
            retained_settled: default_retained_settled(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Human-operator notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    /// Channel name passed to the notifier
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Webhook receiving escalation alerts; alerts are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Delivery attempts before giving up
    #[serde(default = "default_notification_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_notification_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_channel() -> String {
    "operators".to_string()
}

const fn default_notification_attempts() -> u32 {
    3
}

const fn default_notification_backoff_ms() -> u64 {
    500
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            webhook_url: None,
            max_attempts: default_notification_attempts(),
            initial_backoff_ms: default_notification_backoff_ms(),
        }
    }
}

/// Business calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusinessHoursConfig {
    /// When false every hour counts as a business hour
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Opening hour (0-23), local time
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Closing hour (1-24), local time
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// Local time offset from UTC in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Working weekdays, lowercase three-letter names
    #[serde(default = "default_workdays")]
    pub workdays: Vec<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_open_hour() -> u32 {
    9
}

const fn default_close_hour() -> u32 {
    17
}

fn default_workdays() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            utc_offset_minutes: 0,
            workdays: default_workdays(),
        }
    }
}

impl BusinessHoursConfig {
    /// A calendar in which every hour is a business hour.
    pub fn always_open() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
