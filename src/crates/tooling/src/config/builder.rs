//! Configuration builder trait
//!
//! Configuration is layered: defaults (or a loaded file) first, environment
//! overrides on top, validation last.

use crate::Result;

/// Trait for configuration structures with defaults, env overrides and validation
pub trait ConfigBuilder: Default + Clone {
    /// Validate the configuration
    ///
    /// Returns an error describing the first out-of-range or inconsistent value.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Overlay values from environment variables named `{prefix}{FIELD}`
    ///
    /// Variables that are not set leave the current value untouched.
    fn apply_env(&mut self, prefix: &str) -> Result<()>;

    /// Default configuration, validated
    fn build() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the environment, validated
    fn from_env(prefix: &str) -> Result<Self> {
        Self::default().with_env(prefix)
    }

    /// Overlay the environment onto an existing value and validate the result
    fn with_env(mut self, prefix: &str) -> Result<Self> {
        self.apply_env(prefix)?;
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::get_env_parse;
    use crate::ToolingError;

    #[derive(Debug, Clone, PartialEq)]
    struct ScoringConfig {
        reject_threshold: f64,
        accept_threshold: f64,
    }

    impl Default for ScoringConfig {
        fn default() -> Self {
            Self {
                reject_threshold: 6.0,
                accept_threshold: 3.0,
            }
        }
    }

    impl ConfigBuilder for ScoringConfig {
        fn validate(&self) -> Result<()> {
            if self.accept_threshold > self.reject_threshold {
                return Err(ToolingError::InvalidConfig(
                    "accept_threshold exceeds reject_threshold".into(),
                ));
            }
            Ok(())
        }

        fn apply_env(&mut self, prefix: &str) -> Result<()> {
            if let Some(value) = get_env_parse(&format!("{prefix}REJECT_THRESHOLD"))? {
                self.reject_threshold = value;
            }
            if let Some(value) = get_env_parse(&format!("{prefix}ACCEPT_THRESHOLD"))? {
                self.accept_threshold = value;
            }
            Ok(())
        }
    }

    #[test]
    fn test_build_returns_defaults() {
        assert_eq!(ScoringConfig::build().unwrap(), ScoringConfig::default());
    }

    #[test]
    fn test_from_env_overlays_set_values() {
        std::env::set_var("TOOLING_BUILDER_A_REJECT_THRESHOLD", "8.5");
        let config = ScoringConfig::from_env("TOOLING_BUILDER_A_").unwrap();
        std::env::remove_var("TOOLING_BUILDER_A_REJECT_THRESHOLD");

        assert_eq!(config.reject_threshold, 8.5);
        assert_eq!(config.accept_threshold, 3.0);
    }

    #[test]
    fn test_with_env_validates_result() {
        std::env::set_var("TOOLING_BUILDER_B_ACCEPT_THRESHOLD", "9.0");
        let result = ScoringConfig::default().with_env("TOOLING_BUILDER_B_");
        std::env::remove_var("TOOLING_BUILDER_B_ACCEPT_THRESHOLD");

        assert!(matches!(result, Err(ToolingError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_env_keeps_existing_values() {
        let loaded = ScoringConfig {
            reject_threshold: 10.0,
            accept_threshold: 1.0,
        };
        let config = loaded.clone().with_env("TOOLING_BUILDER_UNSET_").unwrap();
        assert_eq!(config, loaded);
    }
}
