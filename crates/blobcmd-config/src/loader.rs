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
use crate::error::{ConfigError, ConfigResult};
use crate::schema::Config;
use crate::validation::Validator;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::read(path, e))?;
        let format = ConfigFormat::from_path(path)?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config: Config = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?,
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?,
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?,
        };

        debug!("Configuration loaded from {}", format.name());
        self.finish(config)
    }

    /// Load configuration with environment variable overrides
    pub async fn load_with_overrides<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let mut config = ConfigLoader::without_validation().load_file(path).await?;
        self.apply_env_overrides(&mut config)?;
        self.finish(config)
    }

    /// Defaults plus environment variable overrides, for runs without a file
    pub fn load_from_env(&self) -> ConfigResult<Config> {
        let mut config = Config::default();
        self.apply_env_overrides(&mut config)?;
        self.finish(config)
    }

    /// Merge multiple configuration files; later files take precedence
    pub async fn load_and_merge<P: AsRef<Path>>(&self, paths: &[P]) -> ConfigResult<Config> {
        let (first, rest) = paths.split_first().ok_or(ConfigError::NothingToMerge)?;

        let unchecked = ConfigLoader::without_validation();
        let mut merged = unchecked.load_file(first).await?;
        for path in rest {
            let overlay = unchecked.load_file(path).await?;
            merge_configs(&mut merged, &overlay);
        }

        self.finish(merged)
    }

    fn finish(&self, config: Config) -> ConfigResult<Config> {
        if self.validate {
            config.validate()?;
            debug!("Configuration validated successfully");
        }
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        apply_overrides(config, |name| std::env::var(name).ok())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply overrides read through `lookup`, which maps a variable name to its value
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Account settings, named as the Azure CLI tools name them
    if let Some(value) = lookup("AZURE_STORAGE_ACCOUNT") {
        config.account.name = value;
    }
    if let Some(value) = lookup("AZURE_STORAGE_ACCESS_KEY") {
        config.account.key = Some(value);
    }
    if let Some(value) = lookup("AZURE_STORAGE_CONTAINER") {
        config.account.container = Some(value);
    }
    if let Some(value) = lookup("AZURE_STORAGE_PREFIX") {
        config.account.prefix = Some(value);
    }
    if let Some(value) = lookup("AZURE_STORAGE_ENTRYPOINT") {
        config.account.endpoint = value;
    }
    if let Some(value) = lookup("AZURE_DISABLE_HTTPS") {
        config.account.use_https = !parse_bool("AZURE_DISABLE_HTTPS", &value)?;
    }
    if let Some(value) = lookup("AZURE_PARALLELISM") {
        config.listing.parallelism = parse_number("AZURE_PARALLELISM", &value)?;
    }
    if let Some(value) = lookup("BLOBCMD_EMULATOR_URL") {
        config.account.emulator_url = Some(value);
    }

    // Listing and upload tuning
    if let Some(value) = lookup("BLOBCMD_PAGE_BUFFER") {
        config.listing.page_buffer_size = parse_number("BLOBCMD_PAGE_BUFFER", &value)?;
    }
    if let Some(value) = lookup("BLOBCMD_BLOCK_SIZE") {
        config.upload.block_size = parse_number("BLOBCMD_BLOCK_SIZE", &value)?;
    }

    // Observability settings
    if let Some(value) = lookup("BLOBCMD_LOG_LEVEL") {
        config.observability.log_level = value;
    }
    if let Some(value) = lookup("BLOBCMD_LOG_FORMAT") {
        config.observability.log_format = value;
    }

    Ok(())
}

/// Merge second config into first (second takes precedence where it differs
/// from the defaults)
fn merge_configs(base: &mut Config, overlay: &Config) {
    let defaults = Config::default();

    if !overlay.account.name.is_empty() {
        base.account.name.clone_from(&overlay.account.name);
    }
    if overlay.account.key.is_some() {
        base.account.key.clone_from(&overlay.account.key);
    }
    if overlay.account.endpoint != defaults.account.endpoint {
        base.account.endpoint.clone_from(&overlay.account.endpoint);
    }
    if !overlay.account.use_https {
        base.account.use_https = false;
    }
    if overlay.account.container.is_some() {
        base.account.container.clone_from(&overlay.account.container);
    }
    if overlay.account.prefix.is_some() {
        base.account.prefix.clone_from(&overlay.account.prefix);
    }
    if overlay.account.emulator_url.is_some() {
        base.account.emulator_url.clone_from(&overlay.account.emulator_url);
    }

    if overlay.listing != defaults.listing {
        base.listing = overlay.listing.clone();
    }
    if overlay.upload != defaults.upload {
        base.upload = overlay.upload.clone();
    }
    if overlay.limits != defaults.limits {
        base.limits = overlay.limits.clone();
    }
    if overlay.observability != defaults.observability {
        base.observability = overlay.observability.clone();
    }

    for (account, key) in &overlay.account_keys {
        base.account_keys.insert(account.clone(), key.clone());
    }
}

/// Parse boolean from string (accepts: true, false, yes, no, 1, 0, on, off)
fn parse_bool(variable: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" | "" => Ok(false),
        _ => Err(ConfigError::env_override(
            variable,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}

fn parse_number<T: FromStr>(variable: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_override(variable, value, "expected a whole number"))
}
