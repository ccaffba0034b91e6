use crate::config::Config;
use crate::digest::HashAlgorithm;
use crate::error::ConfigError;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a fully defaulted configuration
    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        Self::validate_base_path(&config.base)
    }

    /// The base path is either empty or absolute
    pub fn validate_base_path(base: &str) -> Result<(), ConfigError> {
        if base.is_empty() {
            return Ok(());
        }

        if !base.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "Base path '{}' must start with '/'",
                base
            )));
        }

        if base.contains(|c: char| matches!(c, '*' | ':' | '{' | '}')) {
            return Err(ConfigError::Invalid(format!(
                "Base path '{}' must not contain route pattern characters",
                base
            )));
        }

        Ok(())
    }

    /// Unknown names are allowed and fall back to sha1; only warn about them
    pub fn check_hash_algorithm(sha: &str) {
        if !sha.is_empty() && HashAlgorithm::parse(sha).is_none() {
            tracing::warn!(
                sha = %sha,
                fallback = %HashAlgorithm::FALLBACK,
                "Unrecognized default hash algorithm"
            );
        }
    }
}
