//! Configuration management utilities
//!
//! - `ConfigBuilder`: defaults, environment overlay and validation behind one trait
//! - env helpers that load and parse prefixed environment variables
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::{get_env_parse, ConfigBuilder};
//!
//! #[derive(Clone, Default)]
//! struct LimitsConfig {
//!     max_input_bytes: usize,
//! }
//!
//! impl ConfigBuilder for LimitsConfig {
//!     fn validate(&self) -> tooling::Result<()> {
//!         if self.max_input_bytes < 1024 {
//!             return Err(tooling::ToolingError::InvalidConfig(
//!                 "max_input_bytes must be at least 1024".into(),
//!             ));
//!         }
//!         Ok(())
//!     }
//!
//!     fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
//!         if let Some(bytes) = get_env_parse(&format!("{prefix}MAX_INPUT_BYTES"))? {
//!             self.max_input_bytes = bytes;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let limits = LimitsConfig::from_env("DEEP_VERIFY_")?;
//! ```

mod builder;
mod env;

pub use builder::ConfigBuilder;
pub use env::{build_env_key, get_env, get_env_bool, get_env_list, get_env_parse};
