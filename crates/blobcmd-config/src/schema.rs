use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Endpoint suffix of the public cloud
pub const DEFAULT_ENDPOINT: &str = "core.windows.net";

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Default storage account and where commands point without a URI
    pub account: AccountConfig,

    /// Listing behavior
    pub listing: ListingConfig,

    /// Block upload tuning
    pub upload: UploadConfig,

    /// Address limits
    pub limits: LimitsConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,

    /// Shared keys of further accounts, by account name
    #[serde(default)]
    pub account_keys: HashMap<String, String>,
}

impl Config {
    /// Shared key for `account`
    ///
    /// Keys listed under `account_keys` win; otherwise the default account
    /// key applies to every account.
    pub fn key_for(&self, account: &str) -> Option<&str> {
        self.account_keys
            .get(account)
            .map(String::as_str)
            .or(self.account.key.as_deref())
    }

    /// Load config from a file, falling back to defaults when it is missing
    pub async fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        use crate::ConfigLoader;
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let loader = ConfigLoader::new();
        Ok(loader.load_with_overrides(path).await?)
    }

    /// Write the config as TOML
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

/// Storage account settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    /// Account name
    #[serde(default)]
    pub name: String,

    /// Base64 shared key
    #[serde(default)]
    pub key: Option<String>,

    /// Endpoint suffix, e.g. `core.windows.net`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Use TLS
    #[serde(default = "default_true")]
    pub use_https: bool,

    /// Container used when no URI is given
    #[serde(default)]
    pub container: Option<String>,

    /// Blob path prefix used when no URI is given
    #[serde(default)]
    pub prefix: Option<String>,

    /// Emulator root such as `http://127.0.0.1:10000`; requests use
    /// path-style URLs when set
    #[serde(default)]
    pub emulator_url: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: None,
            endpoint: default_endpoint(),
            use_https: true,
            container: None,
            prefix: None,
            emulator_url: None,
        }
    }
}

/// Listing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingConfig {
    /// Pages buffered between the fetching task and the consumer
    #[serde(default = "default_page_buffer_size")]
    pub page_buffer_size: usize,

    /// List without the `/` delimiter by default
    #[serde(default)]
    pub recursive: bool,

    /// URIs listed at the same time when several are given
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_buffer_size: default_page_buffer_size(),
            recursive: false,
            parallelism: default_parallelism(),
        }
    }
}

/// Upload settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// Bytes per staged block
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Blocks staged at the same time
    #[serde(default = "default_one")]
    pub max_concurrent_stages: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            max_concurrent_stages: 1,
        }
    }
}

/// Address limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Longest container name accepted in `wasb[s]://` paths
    #[serde(default = "default_max_container_name_len")]
    pub max_container_name_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_container_name_len: default_max_container_name_len(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging level or filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_page_buffer_size() -> usize {
    1024
}

fn default_parallelism() -> usize {
    num_cpus::get()
}

fn default_block_size() -> usize {
    4 * 1024 * 1024
}

fn default_max_container_name_len() -> usize {
    63
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.account.endpoint, "core.windows.net");
        assert!(config.account.use_https);
        assert_eq!(config.listing.page_buffer_size, 1024);
        assert!(config.listing.parallelism >= 1);
        assert_eq!(config.upload.block_size, 4 * 1024 * 1024);
        assert_eq!(config.upload.max_concurrent_stages, 1);
        assert_eq!(config.limits.max_container_name_len, 63);
    }

    #[test]
    fn test_key_lookup_prefers_account_keys() {
        let mut config = Config::default();
        config.account.key = Some("ZGVmYXVsdA==".to_string());
        config
            .account_keys
            .insert("other".to_string(), "b3RoZXI=".to_string());

        assert_eq!(config.key_for("other"), Some("b3RoZXI="));
        assert_eq!(config.key_for("anything"), Some("ZGVmYXVsdA=="));

        config.account.key = None;
        assert_eq!(config.key_for("anything"), None);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: Config = toml::from_str("[account]\nname = \"acct\"\n").unwrap();
        assert_eq!(config.account.name, "acct");
        assert_eq!(config.account.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.listing, ListingConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/blobcmd.toml");

        let mut config = Config::default();
        config.account.name = "acct".to_string();
        config.upload.max_concurrent_stages = 4;
        config.save(&path).unwrap();

        let loaded = crate::ConfigLoader::new().load_file(&path).await.unwrap();
        assert_eq!(loaded.account.name, "acct");
        assert_eq!(loaded.upload.max_concurrent_stages, 4);
    }
}
