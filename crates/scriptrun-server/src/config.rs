//! Server configuration.
//!
//! Everything the pipeline needs to know about its environment: where the
//! scripts live, how long an invocation may run when the request does not say,
//! and how many loaded scripts to keep around.

use scriptrun_common::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of script modules kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Configuration for a [`ScriptRunner`](crate::ScriptRunner).
///
/// # Example
///
/// ```
/// use scriptrun_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_scripts_dir("/srv/scripts")
///     .with_default_timeout(Duration::from_secs(30))
///     .with_cache_capacity(8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Directory holding `<name>.js` script files
    pub scripts_dir: PathBuf,
    /// Timeout applied when a request has no `timeout` query parameter
    pub default_timeout: Duration,
    /// Maximum number of loaded modules kept in the LRU cache
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripts_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scripts_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Default timeout in whole seconds.
    pub fn default_timeout_secs(&self) -> u64 {
        self.default_timeout.as_secs()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The default timeout is zero, not a whole number of seconds, or above
    ///   the per-request maximum
    /// - The cache capacity is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout.is_zero() {
            return Err("default timeout must be greater than zero".to_string());
        }

        if self.default_timeout.subsec_nanos() != 0 {
            return Err("default timeout must be a whole number of seconds".to_string());
        }

        if self.default_timeout.as_secs() > MAX_TIMEOUT_SECS {
            return Err(format!(
                "default timeout must be <= {} seconds (got {} seconds)",
                MAX_TIMEOUT_SECS,
                self.default_timeout.as_secs()
            ));
        }

        if self.cache_capacity == 0 {
            return Err("cache capacity must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.scripts_dir, PathBuf::from("scripts"));
        assert_eq!(config.default_timeout_secs(), 300);
        assert_eq!(config.cache_capacity, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern_chaining() {
        let config = ServerConfig::new()
            .with_scripts_dir("/tmp/scripts")
            .with_default_timeout(Duration::from_secs(15))
            .with_cache_capacity(4);

        assert_eq!(config.scripts_dir, PathBuf::from("/tmp/scripts"));
        assert_eq!(config.default_timeout_secs(), 15);
        assert_eq!(config.cache_capacity, 4);
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let config = ServerConfig::new().with_default_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.contains("greater than zero"));
    }

    #[test]
    fn test_validate_fractional_timeout_fails() {
        let config = ServerConfig::new().with_default_timeout(Duration::from_millis(1500));
        let err = config.validate().unwrap_err();
        assert!(err.contains("whole number"));
    }

    #[test]
    fn test_validate_excessive_timeout_fails() {
        let config = ServerConfig::new().with_default_timeout(Duration::from_secs(301));
        let err = config.validate().unwrap_err();
        assert!(err.contains("300 seconds"));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let config = ServerConfig::new().with_cache_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equality() {
        let a = ServerConfig::new().with_cache_capacity(2);
        let b = ServerConfig::new().with_cache_capacity(2);
        let c = ServerConfig::new().with_cache_capacity(3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
