//! Logging settings
//!
//! A [`LogConfig`] comes from the `observability` section of the blobcmd
//! configuration (`log_level`, `log_format`) or is built in code. The level
//! string is turned into an `EnvFilter` directive list by
//! [`LogConfig::filter_directives`], which keeps the HTTP stack that talks to
//! the storage service at `warn` unless the caller names those crates.

use std::str::FromStr;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Crates under the storage client's HTTP transport. Their debug output is
/// per-connection noise that drowns out blob operations.
pub const TRANSPORT_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls"];

/// Used when neither the settings nor `RUST_LOG` choose a level
pub const DEFAULT_LEVEL: &str = "warn";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("unknown log format '{0}'; use pretty, compact or json")]
    UnknownFormat(String),

    #[error("invalid log level '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("logging is already set up for this process: {0}")]
    AlreadyInitialized(String),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable output
    Pretty,

    /// Single-line output
    #[default]
    Compact,

    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::UnknownFormat(s.to_string())),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Standard error. Listing records are printed on stdout, so this is
    /// the default.
    #[default]
    Stderr,

    Stdout,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,

    /// A bare level ("debug") or a directive list
    /// ("warn,blobcmd_storage=trace"). `None` defers to `RUST_LOG`, then
    /// [`DEFAULT_LEVEL`].
    pub level: Option<String>,

    /// ANSI colors. `None` enables them only when the output is a terminal.
    pub use_color: Option<bool>,

    pub include_targets: bool,

    pub output: LogOutput,

    /// Cap [`TRANSPORT_TARGETS`] at `warn` when the global level is louder
    pub quiet_transport: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::default(),
            level: None,
            use_color: None,
            include_targets: true,
            output: LogOutput::default(),
            quiet_transport: true,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from the `log_level` and `log_format` strings of the
    /// `observability` section
    pub fn from_settings(level: &str, format: &str) -> Result<Self, LogError> {
        let config = Self::new().with_format(format.parse()?).with_level(level.trim());
        config.check_level()?;
        Ok(config)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = Some(use_color);
        self
    }

    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Let the HTTP transport log at the same level as everything else
    pub fn with_transport_logs(mut self) -> Self {
        self.quiet_transport = false;
        self
    }

    /// The level string in effect: settings, then `RUST_LOG`, then
    /// [`DEFAULT_LEVEL`]
    pub fn get_effective_level(&self) -> String {
        self.level
            .clone()
            .filter(|level| !level.trim().is_empty())
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
    }

    /// Directive list handed to `EnvFilter`
    ///
    /// When the global level is louder than `warn`, every transport crate the
    /// level string does not mention gets a `<crate>=warn` directive.
    pub fn filter_directives(&self) -> String {
        let level = self.get_effective_level();
        if !self.quiet_transport {
            return level;
        }

        let parts: Vec<&str> = level.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        let global = parts
            .iter()
            .filter(|p| !p.contains('='))
            .filter_map(|p| p.parse::<LevelFilter>().ok())
            .max();
        match global {
            Some(global) if global > LevelFilter::WARN => {}
            _ => return level,
        }

        let mut directives = parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        for target in TRANSPORT_TARGETS {
            let named = parts
                .iter()
                .any(|p| p.split(['=', '[']).next() == Some(*target));
            if !named {
                directives.push(format!("{}=warn", target));
            }
        }
        directives.join(",")
    }

    /// Reject level strings that are neither a level nor valid directives
    fn check_level(&self) -> Result<(), LogError> {
        let level = self.get_effective_level();
        for part in level.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let value = part.rsplit('=').next().unwrap_or(part);
            if value.parse::<LevelFilter>().is_err() {
                return Err(LogError::InvalidFilter {
                    filter: level.clone(),
                    reason: format!("'{}' is not one of off, error, warn, info, debug, trace", value),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!(" Json ".parse::<LogFormat>().unwrap(), LogFormat::Json);

        let err = "text".parse::<LogFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unknown log format 'text'; use pretty, compact or json");
    }

    #[test]
    fn test_from_settings() {
        let config = LogConfig::from_settings("blobcmd_storage=debug", "json").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.get_effective_level(), "blobcmd_storage=debug");
        assert!(LogConfig::from_settings("info", "xml").is_err());
    }

    #[test]
    fn test_from_settings_rejects_unknown_level() {
        let err = LogConfig::from_settings("chatty", "compact").unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter { .. }));
        assert!(LogConfig::from_settings("blobcmd_storage=loud", "compact").is_err());
    }

    #[test]
    fn test_defaults_keep_stdout_free() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.use_color, None);
        assert!(config.quiet_transport);
    }

    #[test]
    fn test_debug_level_quiets_transport() {
        let directives = LogConfig::new().with_level("debug").filter_directives();
        assert_eq!(
            directives,
            "debug,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn"
        );
    }

    #[test]
    fn test_quiet_levels_are_left_alone() {
        assert_eq!(LogConfig::new().with_level("warn").filter_directives(), "warn");
        assert_eq!(LogConfig::new().with_level("error").filter_directives(), "error");
        assert_eq!(
            LogConfig::new().with_level("blobcmd_storage=trace").filter_directives(),
            "blobcmd_storage=trace"
        );
    }

    #[test]
    fn test_named_transport_crate_keeps_its_level() {
        let directives = LogConfig::new()
            .with_level("info,reqwest=debug")
            .filter_directives();
        assert_eq!(
            directives,
            "info,reqwest=debug,hyper=warn,hyper_util=warn,h2=warn,rustls=warn"
        );
    }

    #[test]
    fn test_transport_logs_opt_in() {
        let config = LogConfig::new().with_level("trace").with_transport_logs();
        assert_eq!(config.filter_directives(), "trace");
    }
}
