//! YAML Configuration File Support for vpdedup
//!
//! This module loads the index, store, matcher, algorithm registry and logging
//! settings from a single YAML file and turns them into the runtime types of
//! the workspace crates.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! # vpdedup configuration
//! version: "1.0"
//!
//! index:
//!   parallel_threshold: 500
//!   allow_duplicates: true
//!   seed: null
//!
//! store:
//!   backend: "tree"        # list | linear | tree
//!   path: null             # required for linear
//!   sync_on_write: false
//!   strict: false
//!
//! matcher:
//!   block_size: 1024
//!   mode: "normal"
//!   exclude_same_provenance: true
//!
//! algorithms:
//!   - id: "bhash256"
//!     length: 256
//!     metric: "hamming"
//!     thresholds: { exact: 0, strict: 8, normal: 24, sloppy: 40 }
//!
//! logging:
//!   filter: "info"
//!   json: false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fingerprint::{AlgorithmRegistry, AlgorithmSpec, MatchMode, RegistryBuilder};
use index::IndexConfig;
use matcher::{MatchConfig, MatchEngine, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use store::{BackendConfig, LinearStoreConfig};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level YAML configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VpdedupConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    /// VP-tree construction settings, shared by the tree backend
    #[serde(default)]
    pub index: IndexYamlConfig,

    /// Store backend selection
    #[serde(default)]
    pub store: StoreYamlConfig,

    /// Bulk matcher settings
    #[serde(default)]
    pub matcher: MatchYamlConfig,

    /// Algorithms registered on top of the built-in 64-bit hashes
    #[serde(default)]
    pub algorithms: Vec<AlgorithmSpec>,

    /// Tracing subscriber settings used by [`crate::init_logging`]
    #[serde(default)]
    pub logging: LoggingYamlConfig,
}

impl VpdedupConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: VpdedupConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.index.validate()?;
        self.store.validate()?;
        self.matcher.validate()?;
        self.logging.validate()?;
        // Surfaces duplicate ids and malformed thresholds.
        self.registry()?;
        Ok(())
    }

    /// Built-in algorithms plus every entry of `algorithms`.
    pub fn registry(&self) -> Result<AlgorithmRegistry, ConfigLoadError> {
        let mut builder = RegistryBuilder::new().with_defaults();
        for spec in &self.algorithms {
            builder = builder.register(spec.clone()).map_err(|err| {
                ConfigLoadError::Validation(format!("algorithms.{}: {err}", spec.id))
            })?;
        }
        Ok(builder.build())
    }

    pub fn index_config(&self) -> IndexConfig {
        self.index.to_index_config()
    }

    pub fn match_config(&self) -> MatchConfig {
        self.matcher.to_match_config()
    }

    /// Matcher wired to this configuration's registry.
    pub fn match_engine(&self) -> Result<MatchEngine, ConfigLoadError> {
        MatchEngine::new(Arc::new(self.registry()?), self.match_config())
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))
    }

    pub fn backend_config(&self) -> Result<BackendConfig, ConfigLoadError> {
        self.store.to_backend_config(self.index_config())
    }
}

impl Default for VpdedupConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            index: IndexYamlConfig::default(),
            store: StoreYamlConfig::default(),
            matcher: MatchYamlConfig::default(),
            algorithms: Vec::new(),
            logging: LoggingYamlConfig::default(),
        }
    }
}

/// Index YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    #[serde(default = "true_value")]
    pub allow_duplicates: bool,

    /// Fixed seed for reproducible vantage selection
    #[serde(default)]
    pub seed: Option<u64>,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.parallel_threshold == 0 {
            return Err(ConfigLoadError::Validation(
                "index.parallel_threshold must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    fn to_index_config(&self) -> IndexConfig {
        let config = IndexConfig::new()
            .with_parallel_threshold(self.parallel_threshold)
            .with_allow_duplicates(self.allow_duplicates);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: index::DEFAULT_PARALLEL_THRESHOLD,
            allow_duplicates: true,
            seed: None,
        }
    }
}

/// Store YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub sync_on_write: bool,

    #[serde(default)]
    pub strict: bool,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["list", "linear", "tree"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: {valid_backends:?}"
            )));
        }
        if self.backend == "linear" && self.path.is_none() {
            return Err(ConfigLoadError::MissingField(
                "store.path is required when backend is 'linear'".to_string(),
            ));
        }
        Ok(())
    }

    fn to_backend_config(&self, index: IndexConfig) -> Result<BackendConfig, ConfigLoadError> {
        match self.backend.as_str() {
            "list" => Ok(BackendConfig::list()),
            "tree" => Ok(BackendConfig::tree_with(index)),
            "linear" => {
                let path = self.path.clone().ok_or_else(|| {
                    ConfigLoadError::MissingField("store.path".to_string())
                })?;
                Ok(BackendConfig::Linear(
                    LinearStoreConfig::new(path)
                        .with_sync_on_write(self.sync_on_write)
                        .with_strict(self.strict),
                ))
            }
            other => Err(ConfigLoadError::Validation(format!(
                "unknown store backend `{other}`"
            ))),
        }
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            sync_on_write: false,
            strict: false,
        }
    }
}

/// Matcher YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchYamlConfig {
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub mode: MatchMode,

    #[serde(default = "true_value")]
    pub exclude_same_provenance: bool,
}

impl MatchYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.block_size == 0 {
            return Err(ConfigLoadError::Validation(
                "matcher.block_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    fn to_match_config(&self) -> MatchConfig {
        MatchConfig::new()
            .with_block_size(self.block_size)
            .with_mode(self.mode)
            .with_exclude_same_provenance(self.exclude_same_provenance)
    }
}

impl Default for MatchYamlConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            mode: MatchMode::default(),
            exclude_same_provenance: true,
        }
    }
}

/// Logging YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingYamlConfig {
    /// `EnvFilter` directive, e.g. `info` or `vpdedup=debug,index=trace`
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

// Helper functions for serde defaults
fn true_value() -> bool {
    true
}

fn default_parallel_threshold() -> usize {
    index::DEFAULT_PARALLEL_THRESHOLD
}

fn default_backend() -> String {
    "tree".to_string()
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingerprint::MetricKind;

    #[test]
    fn test_default_config() {
        let config = VpdedupConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.store.backend, "tree");
        assert_eq!(config.matcher.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml() {
        let config = VpdedupConfig::from_yaml("version: \"1.0\"\n").unwrap();
        assert_eq!(config.index.parallel_threshold, 500);
        assert!(config.index.allow_duplicates);
        assert_eq!(config.matcher.mode, MatchMode::Normal);
        assert!(matches!(config.backend_config().unwrap(), BackendConfig::Tree(_)));
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
version: "1.0"
name: "photo library"
index:
  parallel_threshold: 64
  allow_duplicates: false
  seed: 7
store:
  backend: "linear"
  path: "/var/lib/vpdedup/hashes.log"
  sync_on_write: true
  strict: true
matcher:
  block_size: 256
  mode: "strict"
  exclude_same_provenance: false
algorithms:
  - id: "bhash256"
    length: 256
    metric: "hamming"
    thresholds: { exact: 0, strict: 8, normal: 24, sloppy: 40 }
logging:
  filter: "debug"
  json: true
"#;
        let config = VpdedupConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("photo library"));

        let index = config.index_config();
        assert_eq!(index.parallel_threshold, 64);
        assert!(!index.allow_duplicates);
        assert_eq!(index.seed, Some(7));

        match config.backend_config().unwrap() {
            BackendConfig::Linear(linear) => {
                assert_eq!(linear.path, PathBuf::from("/var/lib/vpdedup/hashes.log"));
                assert!(linear.sync_on_write);
                assert!(linear.strict);
            }
            other => panic!("expected linear backend, got {other:?}"),
        }

        let engine = config.match_engine().unwrap();
        assert_eq!(engine.config().block_size, 256);
        assert_eq!(engine.config().mode, MatchMode::Strict);
        assert!(!engine.config().exclude_same_provenance);

        let registry = config.registry().unwrap();
        let spec = registry.get("bhash256").unwrap();
        assert_eq!(spec.metric, MetricKind::Hamming);
        assert_eq!(registry.threshold("bhash256", MatchMode::Normal).unwrap(), 24.0);
        assert!(registry.get("dhash64").is_some());
        assert!(config.logging.json);
    }

    #[test]
    fn test_unsupported_version() {
        let result = VpdedupConfig::from_yaml("version: \"2.0\"\n");
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_invalid_values() {
        for yaml in [
            "version: \"1.0\"\nindex:\n  parallel_threshold: 0\n",
            "version: \"1.0\"\nmatcher:\n  block_size: 0\n",
            "version: \"1.0\"\nstore:\n  backend: \"rocksdb\"\n",
            "version: \"1.0\"\nlogging:\n  filter: \"\"\n",
        ] {
            assert!(
                matches!(VpdedupConfig::from_yaml(yaml), Err(ConfigLoadError::Validation(_))),
                "accepted: {yaml}"
            );
        }
    }

    #[test]
    fn test_linear_requires_path() {
        let result = VpdedupConfig::from_yaml("version: \"1.0\"\nstore:\n  backend: \"linear\"\n");
        assert!(matches!(result, Err(ConfigLoadError::MissingField(_))));
    }

    #[test]
    fn test_bad_algorithm_registrations() {
        let decreasing = r#"
version: "1.0"
algorithms:
  - id: "bhash256"
    length: 256
    metric: "hamming"
    thresholds: { exact: 0, strict: 30, normal: 24, sloppy: 40 }
"#;
        assert!(matches!(
            VpdedupConfig::from_yaml(decreasing),
            Err(ConfigLoadError::Validation(_))
        ));

        let duplicate = r#"
version: "1.0"
algorithms:
  - id: "dhash64"
    length: 64
    metric: "hamming"
    thresholds: { exact: 0, strict: 2, normal: 6, sloppy: 10 }
"#;
        assert!(matches!(
            VpdedupConfig::from_yaml(duplicate),
            Err(ConfigLoadError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = VpdedupConfig::from_yaml("version: \"1.0\"\nmatcher:\n  mode: \"fuzzy\"\n");
        assert!(matches!(result, Err(ConfigLoadError::YamlParse(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpdedup.yaml");
        fs::write(&path, "version: \"1\"\nstore:\n  backend: \"list\"\n").unwrap();
        let config = VpdedupConfig::from_file(&path).unwrap();
        assert!(matches!(config.backend_config().unwrap(), BackendConfig::List));

        let missing = VpdedupConfig::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(ConfigLoadError::FileRead(_))));
    }
}
