//! Configuration management for chain-mirror.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding the log level.
const LOG_LEVEL_ENV: &str = "CHAIN_MIRROR_LOG_LEVEL";
/// Environment variable overriding the catalog write policy.
const CATALOG_POLICY_ENV: &str = "CHAIN_MIRROR_CATALOG_POLICY";

/// Write policy for data sources and oracle scripts.
///
/// Deployments disagree on whether these catalog entries are created once
/// (`NEW_*` messages) or re-emitted as full snapshots (`SET_*` messages), so
/// the choice is configuration rather than code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPolicy {
    /// `NEW_DATA_SOURCE` / `NEW_ORACLE_SCRIPT`, plain insert.
    #[default]
    InsertOnly,
    /// `SET_DATA_SOURCE` / `SET_ORACLE_SCRIPT`, insert-or-replace.
    Upsert,
}

impl CatalogPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsertOnly => "insert_only",
            Self::Upsert => "upsert",
        }
    }
}

impl fmt::Display for CatalogPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "insert_only" | "insert" => Ok(Self::InsertOnly),
            "upsert" => Ok(Self::Upsert),
            other => Err(CoreError::Config(format!(
                "unknown catalog policy '{other}' (expected insert_only or upsert)"
            ))),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SQLite database file. `None` uses `Paths::database_file()`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Write policy for data sources and oracle scripts.
    #[serde(default)]
    pub catalog_policy: CatalogPolicy,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database_path: None,
            catalog_policy: CatalogPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from `paths.config_file()`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// The database file to open.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty(LOG_LEVEL_ENV) {
            self.log_level = level;
        }
        if let Some(policy) = non_empty(CATALOG_POLICY_ENV) {
            self.catalog_policy = policy.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.database_path.is_none());
        assert_eq!(config.catalog_policy, CatalogPolicy::InsertOnly);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{
                "log_level": "debug",
                "database_path": "/var/lib/mirror/band.sqlite",
                "catalog_policy": "upsert"
            }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/mirror/band.sqlite"))
        );
        assert_eq!(config.catalog_policy, CatalogPolicy::Upsert);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{}").unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            database_path: None,
            catalog_policy: CatalogPolicy::Upsert,
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_database_file_defaults_to_paths() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        assert_eq!(config.database_file(&paths), paths.database_file());

        config.database_path = Some(dir.path().join("other.sqlite"));
        assert_eq!(config.database_file(&paths), dir.path().join("other.sqlite"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("CHAIN_MIRROR_LOG_LEVEL", "warn"),
                ("CHAIN_MIRROR_CATALOG_POLICY", "upsert"),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.catalog_policy, CatalogPolicy::Upsert);
    }

    #[test]
    fn test_empty_override_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("CHAIN_MIRROR_LOG_LEVEL", "  ")]))
            .unwrap();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_invalid_policy_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("CHAIN_MIRROR_CATALOG_POLICY", "merge")]));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_catalog_policy_parse() {
        assert_eq!(
            "insert-only".parse::<CatalogPolicy>().unwrap(),
            CatalogPolicy::InsertOnly
        );
        assert_eq!(
            "INSERT_ONLY".parse::<CatalogPolicy>().unwrap(),
            CatalogPolicy::InsertOnly
        );
        assert_eq!("upsert".parse::<CatalogPolicy>().unwrap(), CatalogPolicy::Upsert);
        assert!("replace".parse::<CatalogPolicy>().is_err());
    }
}
