// ABOUTME: Configuration loading and validation for the fanlog binary.
// ABOUTME: Reads FANLOG_* environment variables and derives store, destination, and timing paths.

use std::path::PathBuf;

use fanlog_core::{CodecLimits, MIN_PROPERTY_UNITS};
use fanlog_store::LogOptions;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("property budget of {units} units is below the minimum of {min} units")]
    BudgetTooSmall { units: usize, min: usize },

    #[error("FANLOG_EXCERPT_UNITS ({excerpt}) must be less than half the property budget ({max_units} units)")]
    ExcerptTooLarge { excerpt: usize, max_units: usize },
}

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct FanlogConfig {
    pub home: PathBuf,
    pub table: String,
    pub partition_size: u64,
    pub max_append_attempts: usize,
    pub limits: CodecLimits,
    pub timing_file: PathBuf,
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        _ => Ok(default),
    }
}

impl FanlogConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - FANLOG_HOME: data directory (default: ~/.fanlog)
    /// - FANLOG_TABLE: table name inside the store (default: ErrorLog)
    /// - FANLOG_PARTITION_SIZE: entries per table partition (default: 1000)
    /// - FANLOG_MAX_PROPERTY_BYTES: per-property byte limit of the store (default: 64000)
    /// - FANLOG_BYTES_PER_UNIT: bytes one UTF-16 code unit costs in the store (default: 2)
    /// - FANLOG_EXCERPT_UNITS: excerpt kept in oversize placeholders (default: 4000)
    /// - FANLOG_MAX_APPEND_ATTEMPTS: conditional inserts per append (default: 64)
    /// - FANLOG_TIMING_FILE: timing CSV (default: $FANLOG_HOME/timings.csv)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("FANLOG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".fanlog")
            });

        let table = std::env::var("FANLOG_TABLE")
            .ok()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "ErrorLog".to_string());

        let partition_size: u64 = parse_var("FANLOG_PARTITION_SIZE", 1000)?;
        let max_append_attempts: usize = parse_var("FANLOG_MAX_APPEND_ATTEMPTS", 64)?;
        let defaults = CodecLimits::default();
        let limits = CodecLimits {
            max_property_bytes: parse_var("FANLOG_MAX_PROPERTY_BYTES", defaults.max_property_bytes)?,
            bytes_per_unit: parse_var("FANLOG_BYTES_PER_UNIT", defaults.bytes_per_unit)?,
            excerpt_units: parse_var("FANLOG_EXCERPT_UNITS", defaults.excerpt_units)?,
        };

        if partition_size == 0 {
            return Err(ConfigError::Zero("FANLOG_PARTITION_SIZE"));
        }
        if max_append_attempts == 0 {
            return Err(ConfigError::Zero("FANLOG_MAX_APPEND_ATTEMPTS"));
        }
        if limits.bytes_per_unit == 0 {
            return Err(ConfigError::Zero("FANLOG_BYTES_PER_UNIT"));
        }
        if limits.max_units() < MIN_PROPERTY_UNITS {
            return Err(ConfigError::BudgetTooSmall {
                units: limits.max_units(),
                min: MIN_PROPERTY_UNITS,
            });
        }
        if limits.excerpt_units >= limits.max_units() / 2 {
            return Err(ConfigError::ExcerptTooLarge {
                excerpt: limits.excerpt_units,
                max_units: limits.max_units(),
            });
        }

        let timing_file = std::env::var("FANLOG_TIMING_FILE")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("timings.csv"));

        Ok(Self {
            home,
            table,
            partition_size,
            max_append_attempts,
            limits,
            timing_file,
        })
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            partition_size: self.partition_size,
            max_append_attempts: self.max_append_attempts,
            limits: self.limits,
        }
    }

    /// SQLite database backing the error log table.
    pub fn store_path(&self) -> PathBuf {
        self.home.join("table.db")
    }

    /// JSONL file written by the secondary destination.
    pub fn records_path(&self) -> PathBuf {
        self.home.join("records.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all tests that read/write env vars to prevent race conditions.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 8] = [
        "FANLOG_HOME",
        "FANLOG_TABLE",
        "FANLOG_PARTITION_SIZE",
        "FANLOG_MAX_PROPERTY_BYTES",
        "FANLOG_BYTES_PER_UNIT",
        "FANLOG_EXCERPT_UNITS",
        "FANLOG_MAX_APPEND_ATTEMPTS",
        "FANLOG_TIMING_FILE",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: test-only code, env access serialized by ENV_MUTEX
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn config_loads_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = FanlogConfig::from_env().unwrap();

        assert_eq!(config.table, "ErrorLog");
        assert_eq!(config.partition_size, 1000);
        assert_eq!(config.max_append_attempts, 64);
        assert_eq!(config.limits, CodecLimits::default());
        assert!(config.home.to_string_lossy().contains(".fanlog"));
        assert_eq!(config.timing_file, config.home.join("timings.csv"));
        assert_eq!(config.store_path(), config.home.join("table.db"));
    }

    #[test]
    fn config_reads_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, env access serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("FANLOG_HOME", "/var/lib/fanlog");
            std::env::set_var("FANLOG_PARTITION_SIZE", "250");
            std::env::set_var("FANLOG_MAX_PROPERTY_BYTES", "1048576");
            std::env::set_var("FANLOG_BYTES_PER_UNIT", "4");
        }

        let result = FanlogConfig::from_env();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.home, PathBuf::from("/var/lib/fanlog"));
        assert_eq!(config.partition_size, 250);
        assert_eq!(config.limits.max_units(), 262_144);
        assert_eq!(config.log_options().partition_size, 250);
    }

    #[test]
    fn config_rejects_zero_partition_size() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, env access serialized by ENV_MUTEX
        unsafe { std::env::set_var("FANLOG_PARTITION_SIZE", "0") };

        let result = FanlogConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("FANLOG_PARTITION_SIZE"),
            "error should name the variable: {}",
            err
        );
    }

    #[test]
    fn config_rejects_garbage_numbers_and_large_excerpts() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, env access serialized by ENV_MUTEX
        unsafe { std::env::set_var("FANLOG_BYTES_PER_UNIT", "two") };
        let result = FanlogConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidNumber { .. })));

        clear_env();
        // SAFETY: test-only code, env access serialized by ENV_MUTEX
        unsafe { std::env::set_var("FANLOG_EXCERPT_UNITS", "20000") };
        let result = FanlogConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::ExcerptTooLarge { .. })));
    }

    #[test]
    fn config_rejects_budget_too_small_for_placeholder() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, env access serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("FANLOG_MAX_PROPERTY_BYTES", "200");
            std::env::set_var("FANLOG_EXCERPT_UNITS", "10");
        }

        let result = FanlogConfig::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::BudgetTooSmall { units: 100, min: MIN_PROPERTY_UNITS })
        ));
    }
}
