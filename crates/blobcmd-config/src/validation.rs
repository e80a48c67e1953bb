use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;

/// Largest block the service accepts (4000 MiB)
const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;

/// Validator for configuration settings
pub trait Validator {
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.account.validate()?;
        self.listing.validate()?;
        self.upload.validate()?;
        self.limits.validate()?;
        self.observability.validate()?;

        for (account, key) in &self.account_keys {
            if account.is_empty() {
                return Err(ConfigError::invalid_value(
                    "account_keys",
                    "account names must not be empty",
                ));
            }
            if key.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("account_keys.{}", account),
                    "key must not be empty",
                ));
            }
        }
        Ok(())
    }
}

impl Validator for AccountConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("account.endpoint".to_string()));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ConfigError::invalid_value(
                "account.name",
                "account name must contain only lowercase letters and digits",
            ));
        }

        if let Some(key) = &self.key {
            if key.trim().is_empty() {
                return Err(ConfigError::invalid_value("account.key", "key must not be empty"));
            }
        }

        if self.prefix.is_some() && self.container.is_none() {
            return Err(ConfigError::ConflictingValues(
                "account.prefix is set without account.container".to_string(),
            ));
        }

        if let Some(url) = &self.emulator_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::invalid_value(
                    "account.emulator_url",
                    format!("must start with http:// or https://, got {}", url),
                ));
            }
        }

        Ok(())
    }
}

impl Validator for ListingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.page_buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                "listing.page_buffer_size",
                "must be greater than 0",
            ));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::invalid_value(
                "listing.parallelism",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validator for UploadConfig {
    fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_range("upload.block_size", self.block_size, 1, MAX_BLOCK_SIZE)?;
        if self.max_concurrent_stages == 0 {
            return Err(ConfigError::invalid_value(
                "upload.max_concurrent_stages",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validator for LimitsConfig {
    fn validate(&self) -> ConfigResult<()> {
        // the service itself allows 3..=63
        ConfigError::check_range("limits.max_container_name_len", self.max_container_name_len, 3, 63)
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "observability.log_level".to_string(),
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_account_name_charset() {
        let mut config = Config::default();
        config.account.name = "My_Account".to_string();
        assert!(config.validate().is_err());

        config.account.name = "myaccount01".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_prefix_needs_container() {
        let mut account = AccountConfig::default();
        account.prefix = Some("2024/".to_string());
        assert!(matches!(
            account.validate(),
            Err(ConfigError::ConflictingValues(_))
        ));

        account.container = Some("logs".to_string());
        assert!(account.validate().is_ok());
    }

    #[test]
    fn test_block_size_bounds() {
        let mut upload = UploadConfig::default();
        upload.block_size = 0;
        assert!(matches!(upload.validate(), Err(ConfigError::OutOfRange { actual: 0, .. })));
        upload.block_size = MAX_BLOCK_SIZE + 1;
        assert!(upload.validate().is_err());
        upload.block_size = MAX_BLOCK_SIZE;
        assert!(upload.validate().is_ok());
    }

    #[test]
    fn test_container_name_limit_range() {
        let mut limits = LimitsConfig::default();
        limits.max_container_name_len = 32;
        assert!(limits.validate().is_ok());
        limits.max_container_name_len = 64;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_log_format_validation() {
        let mut config = Config::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());
        config.observability.log_format = "JSON".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_extra_key_rejected() {
        let mut config = Config::default();
        config.account_keys.insert("other".to_string(), " ".to_string());
        assert!(config.validate().is_err());
    }
}
