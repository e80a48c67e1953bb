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
use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading, overriding or checking a blobcmd configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("cannot read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no configuration file at {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file name has no extension to choose a parser from
    #[error("cannot tell the format of {}: expected .toml, .yaml, .yml or .json", .0.display())]
    InvalidPath(PathBuf),

    #[error("'.{0}' configuration files are not supported; use .toml, .yaml, .yml or .json")]
    UnsupportedFormat(String),

    /// The content does not match the schema
    #[error("malformed {format} configuration: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// An `AZURE_*` or `BLOBCMD_*` variable holds an unusable value
    #[error("environment override {variable}={value} rejected: {reason}")]
    EnvOverride {
        variable: String,
        value: String,
        reason: String,
    },

    /// A numeric setting outside what the storage service accepts
    #[error("{field} must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{0} must be set")]
    MissingRequired(String),

    #[error("conflicting settings: {0}")]
    ConflictingValues(String),

    #[error("no configuration files to merge")]
    NothingToMerge,
}

impl ConfigError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(format: &'static str, error: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            format,
            message: error.to_string(),
        }
    }

    pub fn env_override(
        variable: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::EnvOverride {
            variable: variable.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check `actual` against `min..=max`
    pub fn check_range(field: &'static str, actual: usize, min: usize, max: usize) -> ConfigResult<()> {
        if (min..=max).contains(&actual) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                min,
                max,
                actual,
            })
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
