//! CLI configuration management

use depot_registry::StorageKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name} value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Depot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotConfig {
    /// SQLite connection string for artifact metadata
    pub database_url: String,

    /// Storage roots registered with the router
    pub storage_roots: Vec<String>,

    /// Root the `fs` uploader writes below
    pub upload_root_fs: Option<String>,

    /// Root the `mem` uploader writes below
    pub upload_root_mem: Option<String>,

    /// Root the `s3` uploader writes below
    pub upload_root_s3: Option<String>,

    /// Whether to enable debug logging
    pub debug: bool,
}

impl DepotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage_roots = match var("DEPOT_STORAGE_ROOTS") {
            Some(value) => {
                let roots: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if roots.iter().any(|root| !root.contains("://")) {
                    return Err(ConfigError::Invalid {
                        name: "DEPOT_STORAGE_ROOTS",
                        value,
                    });
                }
                roots
            }
            None => defaults.storage_roots,
        };

        let debug = match var("DEBUG") {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::Invalid { name: "DEBUG", value }),
            },
            None => false,
        };

        let upload_root_fs = var("DEPOT_UPLOAD_ROOT_FS").or_else(|| {
            storage_roots
                .iter()
                .find(|root| root.starts_with("file://"))
                .cloned()
        });

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            storage_roots,
            upload_root_fs,
            upload_root_mem: var("DEPOT_UPLOAD_ROOT_MEM"),
            upload_root_s3: var("DEPOT_UPLOAD_ROOT_S3"),
            debug,
        })
    }

    /// Upload roots that are configured, by storage kind
    pub fn upload_roots(&self) -> Vec<(StorageKind, &str)> {
        [
            (StorageKind::FileSystem, &self.upload_root_fs),
            (StorageKind::Memory, &self.upload_root_mem),
            (StorageKind::S3, &self.upload_root_s3),
        ]
        .into_iter()
        .filter_map(|(kind, root)| root.as_deref().map(|root| (kind, root)))
        .collect()
    }

    /// Default tracing filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "depot=debug,depot_registry=debug,depot_cli=debug"
        } else {
            "depot=info,depot_registry=info,depot_cli=info"
        }
    }
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/depot.db".to_string(),
            storage_roots: vec!["file://./data/artifacts?create_dir=1".to_string()],
            upload_root_fs: Some("file://./data/artifacts?create_dir=1".to_string()),
            upload_root_mem: None,
            upload_root_s3: None,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DepotConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DepotConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:./data/depot.db");
        assert_eq!(config.storage_roots, vec!["file://./data/artifacts?create_dir=1"]);
        // the fs uploader defaults to the first file root
        assert_eq!(
            config.upload_roots(),
            vec![(StorageKind::FileSystem, "file://./data/artifacts?create_dir=1")]
        );
        assert!(!config.debug);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "sqlite:/tmp/x.db"),
            ("DEPOT_STORAGE_ROOTS", "mem://artifacts, s3://bucket?endpoint=http://minio:9000"),
            ("DEPOT_UPLOAD_ROOT_MEM", "mem://artifacts"),
            ("DEPOT_UPLOAD_ROOT_S3", "s3://bucket"),
            ("DEBUG", "TRUE"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "sqlite:/tmp/x.db");
        assert_eq!(config.storage_roots.len(), 2);
        assert_eq!(
            config.upload_roots(),
            vec![
                (StorageKind::Memory, "mem://artifacts"),
                (StorageKind::S3, "s3://bucket"),
            ]
        );
        assert!(config.debug);
        assert!(config.log_filter().contains("depot_registry=debug"));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = load(&[("DEBUG", "sometimes")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid DEBUG value: sometimes");

        let err = load(&[("DEPOT_STORAGE_ROOTS", "/var/lib/depot")]).unwrap_err();
        assert!(err.to_string().starts_with("Invalid DEPOT_STORAGE_ROOTS value"));
    }
}
