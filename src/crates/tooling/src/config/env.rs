//! Environment variable loading
//!
//! Unset variables are `Ok(None)`; set-but-malformed values are errors, so a
//! typo in an override never silently falls back to a default.

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;

/// Load an environment variable as a string
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ToolingError::InvalidConfig(format!(
            "Environment variable {} contains invalid UTF-8",
            key
        ))),
    }
}

/// Load and parse an environment variable
///
/// ```rust,ignore
/// let rpm: Option<u32> = get_env_parse("DEEP_VERIFY_REQUESTS_PER_MINUTE")?;
/// ```
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| {
            ToolingError::InvalidConfig(format!(
                "Failed to parse environment variable {}: {}",
                key, e
            ))
        }),
        None => Ok(None),
    }
}

/// Load a boolean environment variable
///
/// Accepts "true"/"1"/"yes"/"on" and "false"/"0"/"no"/"off", case-insensitive.
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(val) => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ToolingError::InvalidConfig(format!(
                "Invalid boolean value for {}: {}",
                key, val
            ))),
        },
        None => Ok(None),
    }
}

/// Load a comma-separated list, trimming entries and dropping empty ones
pub fn get_env_list(key: &str) -> Result<Option<Vec<String>>> {
    Ok(get_env(key)?.map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    }))
}

/// Build a prefixed environment variable name
///
/// ```rust
/// use tooling::config::build_env_key;
///
/// assert_eq!(build_env_key("DEEP_VERIFY_", "max_lines"), "DEEP_VERIFY_MAX_LINES");
/// ```
pub fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_missing() {
        assert!(get_env("TOOLING_TEST_MISSING_VAR_12345").unwrap().is_none());
    }

    #[test]
    fn test_get_env_parse() {
        env::set_var("TOOLING_TEST_NUMBER", " 42 ");
        let result: Option<u32> = get_env_parse("TOOLING_TEST_NUMBER").unwrap();
        env::remove_var("TOOLING_TEST_NUMBER");

        assert_eq!(result, Some(42));
    }

    #[test]
    fn test_get_env_parse_invalid() {
        env::set_var("TOOLING_TEST_INVALID_NUMBER", "sixty");
        let result: Result<Option<u32>> = get_env_parse("TOOLING_TEST_INVALID_NUMBER");
        env::remove_var("TOOLING_TEST_INVALID_NUMBER");

        assert!(matches!(result, Err(ToolingError::InvalidConfig(_))));
    }

    #[test]
    fn test_get_env_bool() {
        let cases = [
            ("true", true),
            ("YES", true),
            ("1", true),
            ("on", true),
            ("false", false),
            ("Off", false),
            ("0", false),
            ("no", false),
        ];

        for (value, expected) in cases {
            env::set_var("TOOLING_TEST_BOOL", value);
            let result = get_env_bool("TOOLING_TEST_BOOL").unwrap();
            assert_eq!(result, Some(expected), "Failed for value: {}", value);
        }
        env::remove_var("TOOLING_TEST_BOOL");

        env::set_var("TOOLING_TEST_BOOL_INVALID", "maybe");
        assert!(get_env_bool("TOOLING_TEST_BOOL_INVALID").is_err());
        env::remove_var("TOOLING_TEST_BOOL_INVALID");
    }

    #[test]
    fn test_get_env_list() {
        env::set_var("TOOLING_TEST_LIST", "#201, #203,,#205 ");
        let list = get_env_list("TOOLING_TEST_LIST").unwrap();
        env::remove_var("TOOLING_TEST_LIST");

        assert_eq!(
            list,
            Some(vec!["#201".to_string(), "#203".to_string(), "#205".to_string()])
        );
        assert!(get_env_list("TOOLING_TEST_MISSING_VAR_12345").unwrap().is_none());
    }

    #[test]
    fn test_build_env_key() {
        assert_eq!(build_env_key("APP_", "port"), "APP_PORT");
        assert_eq!(build_env_key("", "debug"), "DEBUG");
    }
}
