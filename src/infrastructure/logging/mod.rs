//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rolling JSON log files (daily, hourly or never)

pub mod logger;

pub use logger::{parse_log_level, LogFormat, LoggerImpl};
