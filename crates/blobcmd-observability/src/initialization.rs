// Copyright (C) 2026  blobcmd Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Installing the process-wide subscriber
//!
//! Only one global subscriber can exist per process. [`init_tracing_with_config`]
//! reports a second attempt as [`LogError::AlreadyInitialized`], while
//! [`init_for_tests`] keeps whichever subscriber got there first.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io::{self, IsTerminal};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install a subscriber with the given format and level string
///
/// # Example
///
/// ```no_run
/// use blobcmd_observability::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Compact, Some("blobcmd_storage=debug")).unwrap();
/// tracing::info!(container = "logs", "listing started");
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let config = match level {
        Some(level) => LogConfig::new().with_format(format).with_level(level),
        None => LogConfig::new().with_format(format),
    };
    init_tracing_with_config(config)
}

/// Install a subscriber described by `config`
///
/// # Example
///
/// ```no_run
/// use blobcmd_observability::{init_tracing_with_config, LogConfig};
///
/// // log_level / log_format from the observability section
/// let config = LogConfig::from_settings("info", "json").unwrap();
/// init_tracing_with_config(config).unwrap();
/// ```
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let filter = build_env_filter(&config)?;
    let registry = Registry::default().with(filter);
    let ansi = use_ansi(&config);
    let targets = config.include_targets;

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(make_writer(config.output))
                    .with_target(targets)
                    .with_ansi(ansi)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_writer(make_writer(config.output))
                    .with_target(targets)
                    .with_ansi(ansi)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(make_writer(config.output))
                    .json()
                    .with_target(targets)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .try_init(),
    };

    installed.map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

/// Install a subscriber for tests once; later calls do nothing
///
/// Events go through the test harness capture at `RUST_LOG` or `debug`,
/// with the HTTP transport held at `warn` so emulator round trips stay
/// readable.
pub fn init_for_tests() {
    let config = LogConfig::new().with_level(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()));
    let filter = EnvFilter::try_new(config.filter_directives()).unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}

fn make_writer(output: LogOutput) -> BoxMakeWriter {
    match output {
        LogOutput::Stderr => BoxMakeWriter::new(io::stderr),
        LogOutput::Stdout => BoxMakeWriter::new(io::stdout),
    }
}

/// Colors as configured, otherwise only on a terminal
fn use_ansi(config: &LogConfig) -> bool {
    config.use_color.unwrap_or_else(|| match config.output {
        LogOutput::Stderr => io::stderr().is_terminal(),
        LogOutput::Stdout => io::stdout().is_terminal(),
    })
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives).map_err(|e| LogError::InvalidFilter {
        filter: directives.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Installing the global subscriber is covered in tests/, one install per
    // test binary.

    #[test]
    fn test_env_filter_parsing() {
        assert!(build_env_filter(&LogConfig::new().with_level("debug")).is_ok());
        assert!(build_env_filter(&LogConfig::new().with_level("blobcmd_storage=trace,warn")).is_ok());
    }

    #[test]
    fn test_bad_filter_is_reported() {
        let err = build_env_filter(&LogConfig::new().with_level("blobcmd_storage=loud")).unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter { .. }));
    }

    #[test]
    fn test_explicit_color_wins() {
        assert!(use_ansi(&LogConfig::new().with_color(true)));
        assert!(!use_ansi(&LogConfig::new().with_color(false).with_output(LogOutput::Stdout)));
    }
}
