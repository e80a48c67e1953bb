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
//! Configuration for blobcmd
//!
//! Settings come from a TOML, YAML or JSON file, overridden by environment
//! variables, and are validated before use.
//!
//! # Features
//!
//! - Multi-format configuration support (TOML, YAML, JSON)
//! - Environment overrides using the Azure tool names (`AZURE_STORAGE_ACCOUNT`,
//!   `AZURE_STORAGE_ACCESS_KEY`, ...) and `BLOBCMD_` tuning variables
//! - Per-account shared keys for commands spanning several accounts
//! - Validation with field-level error messages
//!
//! # Example
//!
//! ```no_run
//! use blobcmd_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader.load_with_overrides("blobcmd.toml").await?;
//!
//!     println!("Default account: {}", config.account.name);
//!     println!("Page buffer: {}", config.listing.page_buffer_size);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

// Re-export commonly used items
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::Validator;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.account.name = "acct".to_string();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"acct\""));
        assert!(json.contains("core.windows.net"));
    }

    #[test]
    fn test_yaml_roundtrip_keeps_account_keys() {
        let mut config = Config::default();
        config
            .account_keys
            .insert("other".to_string(), "b3RoZXI=".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
