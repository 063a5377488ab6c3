//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and
//! `SPFMAP_*` environment variables, and merging file configurations with
//! proper precedence rules.

use crate::error::ScanError;
use crate::types::RecordSelection;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Number of lookup workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// SQLite database path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,

    /// Lookup deadline (as string, e.g., "5s", "500ms", "1m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Capacity of the work and results queues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Which records to scan: "spf", "dmarc" or "both"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<String>,
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ScanError` if the file is missing, unreadable, not valid
    /// TOML, or holds out-of-range values.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScanError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            ScanError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;

        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is lowest, then the global file in `$HOME`, then the local
    /// file in the working directory.
    pub fn discover_and_load(&self) -> Result<FileConfig, ScanError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }

        if loaded_files.len() > 1 {
            debug!(
                files = ?loaded_files,
                "multiple config files found, later files take precedence"
            );
        }

        Ok(merged_config)
    }

    /// Get the local configuration file path.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./spfmap.toml", "./.spfmap.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Get the global configuration file path.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".spfmap.toml", "spfmap.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Get the XDG configuration file path.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("spfmap").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations; values from `higher` win.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(mut lower_defaults), Some(higher_defaults)) => {
                    if higher_defaults.workers.is_some() {
                        lower_defaults.workers = higher_defaults.workers;
                    }
                    if higher_defaults.db.is_some() {
                        lower_defaults.db = higher_defaults.db;
                    }
                    if higher_defaults.timeout.is_some() {
                        lower_defaults.timeout = higher_defaults.timeout;
                    }
                    if higher_defaults.queue_capacity.is_some() {
                        lower_defaults.queue_capacity = higher_defaults.queue_capacity;
                    }
                    if higher_defaults.scan.is_some() {
                        lower_defaults.scan = higher_defaults.scan;
                    }
                    Some(lower_defaults)
                }
                (None, Some(higher_defaults)) => Some(higher_defaults),
                (Some(lower_defaults), None) => Some(lower_defaults),
                (None, None) => None,
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), ScanError> {
        let Some(defaults) = &config.defaults else {
            return Ok(());
        };

        if let Some(workers) = defaults.workers {
            if workers == 0 || workers > 100 {
                return Err(ScanError::config("workers must be between 1 and 100"));
            }
        }

        if let Some(capacity) = defaults.queue_capacity {
            if capacity == 0 || capacity > 10_000 {
                return Err(ScanError::config(
                    "queue_capacity must be between 1 and 10000",
                ));
            }
        }

        if let Some(timeout_str) = &defaults.timeout {
            if parse_duration(timeout_str).is_none() {
                return Err(ScanError::config(format!(
                    "Invalid timeout format '{}'. Use format like '5s', '500ms', '2m'",
                    timeout_str
                )));
            }
        }

        if let Some(scan) = &defaults.scan {
            scan.parse::<RecordSelection>()?;
        }

        if let Some(db) = &defaults.db {
            if db.trim().is_empty() {
                return Err(ScanError::config("db cannot be empty"));
            }
        }

        Ok(())
    }
}

/// Configuration taken from `SPFMAP_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub workers: Option<usize>,
    pub db: Option<String>,
    pub timeout: Option<Duration>,
    pub queue_capacity: Option<usize>,
    pub scan: Option<RecordSelection>,
    pub config: Option<String>,
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration from an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    // SPFMAP_WORKERS - number of lookup workers
    if let Some(val) = lookup("SPFMAP_WORKERS") {
        match val.trim().parse::<usize>() {
            Ok(workers) if (1..=100).contains(&workers) => {
                debug!(workers, "using SPFMAP_WORKERS");
                env_config.workers = Some(workers);
            }
            _ => warn!(value = %val, "invalid SPFMAP_WORKERS, must be 1-100"),
        }
    }

    // SPFMAP_DB - database path
    if let Some(db) = lookup("SPFMAP_DB") {
        if !db.trim().is_empty() {
            debug!(db = %db, "using SPFMAP_DB");
            env_config.db = Some(db);
        }
    }

    // SPFMAP_TIMEOUT - lookup deadline
    if let Some(val) = lookup("SPFMAP_TIMEOUT") {
        match parse_duration(&val) {
            Some(timeout) => {
                debug!(?timeout, "using SPFMAP_TIMEOUT");
                env_config.timeout = Some(timeout);
            }
            None => warn!(
                value = %val,
                "invalid SPFMAP_TIMEOUT, use format like '5s', '500ms', '2m'"
            ),
        }
    }

    // SPFMAP_QUEUE_CAPACITY - bounded queue size
    if let Some(val) = lookup("SPFMAP_QUEUE_CAPACITY") {
        match val.trim().parse::<usize>() {
            Ok(capacity) if (1..=10_000).contains(&capacity) => {
                debug!(capacity, "using SPFMAP_QUEUE_CAPACITY");
                env_config.queue_capacity = Some(capacity);
            }
            _ => warn!(value = %val, "invalid SPFMAP_QUEUE_CAPACITY, must be 1-10000"),
        }
    }

    // SPFMAP_SCAN - spf, dmarc or both
    if let Some(val) = lookup("SPFMAP_SCAN") {
        match val.parse::<RecordSelection>() {
            Ok(selection) => {
                debug!(%selection, "using SPFMAP_SCAN");
                env_config.scan = Some(selection);
            }
            Err(_) => warn!(value = %val, "invalid SPFMAP_SCAN, use spf, dmarc or both"),
        }
    }

    // SPFMAP_CONFIG - explicit config file
    if let Some(path) = lookup("SPFMAP_CONFIG") {
        if !path.trim().is_empty() {
            env_config.config = Some(path);
        }
    }

    env_config
}

/// Parse a duration string like "5s", "500ms", "2m" or bare seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    let duration = if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        // Assume seconds if no unit
        value.parse::<u64>().ok().map(Duration::from_secs)
    }?;

    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("30S"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("999999999999999999m"), None);
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"
[defaults]
workers = 12
db = "scan.db"
timeout = "3s"
queue_capacity = 50
scan = "dmarc"
"#,
        );

        let config = ConfigManager::new().load_file(file.path()).unwrap();
        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.workers, Some(12));
        assert_eq!(defaults.db, Some("scan.db".to_string()));
        assert_eq!(defaults.timeout, Some("3s".to_string()));
        assert_eq!(defaults.queue_capacity, Some(50));
        assert_eq!(defaults.scan, Some("dmarc".to_string()));
    }

    #[test]
    fn test_invalid_workers() {
        let file = write_config("[defaults]\nworkers = 0\n");
        let result = ConfigManager::new().load_file(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_scan_selection() {
        let file = write_config("[defaults]\nscan = \"dkim\"\n");
        let err = ConfigManager::new().load_file(file.path()).unwrap_err();
        assert!(matches!(err, ScanError::ConfigError { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_config("[defaults\nworkers = ");
        assert!(ConfigManager::new().load_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigManager::new()
            .load_file("/no/such/spfmap.toml")
            .unwrap_err();
        assert!(matches!(err, ScanError::FileError { .. }));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new();

        let lower = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(5),
                db: Some("global.db".to_string()),
                scan: Some("both".to_string()),
                ..Default::default()
            }),
        };

        let higher = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(20),
                timeout: Some("10s".to_string()),
                ..Default::default()
            }),
        };

        let merged = manager.merge_configs(lower, higher);
        let defaults = merged.defaults.unwrap();

        assert_eq!(defaults.workers, Some(20)); // Higher wins
        assert_eq!(defaults.db, Some("global.db".to_string())); // Lower preserved
        assert_eq!(defaults.timeout, Some("10s".to_string()));
        assert_eq!(defaults.scan, Some("both".to_string()));
    }

    #[test]
    fn test_env_config_parses_valid_values() {
        let vars: HashMap<&str, &str> = [
            ("SPFMAP_WORKERS", "8"),
            ("SPFMAP_DB", "env.db"),
            ("SPFMAP_TIMEOUT", "750ms"),
            ("SPFMAP_QUEUE_CAPACITY", "20"),
            ("SPFMAP_SCAN", "spf"),
            ("SPFMAP_CONFIG", "/etc/spfmap.toml"),
        ]
        .into_iter()
        .collect();

        let env_config = load_env_config_from(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(
            env_config,
            EnvConfig {
                workers: Some(8),
                db: Some("env.db".to_string()),
                timeout: Some(Duration::from_millis(750)),
                queue_capacity: Some(20),
                scan: Some(RecordSelection::Policy),
                config: Some("/etc/spfmap.toml".to_string()),
            }
        );
    }

    #[test]
    fn test_env_config_ignores_invalid_values() {
        let vars: HashMap<&str, &str> = [
            ("SPFMAP_WORKERS", "0"),
            ("SPFMAP_TIMEOUT", "soon"),
            ("SPFMAP_QUEUE_CAPACITY", "-1"),
            ("SPFMAP_SCAN", "dkim"),
            ("SPFMAP_DB", "  "),
        ]
        .into_iter()
        .collect();

        let env_config = load_env_config_from(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(env_config, EnvConfig::default());
    }
}
