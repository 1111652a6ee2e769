use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::hnsw::default_level_lambda;
use crate::semantic::{DistanceMetric, HnswParams, IngestMode, NeighbourHeuristic};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_FAQ_CONFIG: &str = "faq_config.json";
/// Default embedding model name
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_API_URI: &str = "http://127.0.0.1:5000/";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_STORE_PATH: &str = "embedding_cache";
const DEFAULT_QUERY_CACHE_PATH: &str = "query_cache";
const DEFAULT_SEED: u64 = 42;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_yml::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_yml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    #[default]
    Fastembed,
    Api,
}

/// Text encoder settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub kind: EncoderKind,

    /// Model name for the fastembed backend (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the remote encoder for the api backend
    #[serde(default = "default_api_uri")]
    pub api_uri: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Parallelism for embedding generation: "auto" or a positive integer
    #[serde(default = "default_embedding_parallelism")]
    pub embedding_parallelism: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            kind: EncoderKind::default(),
            model: default_model(),
            api_uri: default_api_uri(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            embedding_parallelism: default_embedding_parallelism(),
        }
    }
}

impl EncoderConfig {
    /// Worker count for corpus encoding, `None` meaning rayon's default.
    pub fn parallelism(&self) -> Result<Option<usize>, ConfigError> {
        if self.embedding_parallelism == "auto" {
            return Ok(None);
        }
        match self.embedding_parallelism.parse::<usize>() {
            Ok(0) | Err(_) => Err(ConfigError::Invalid(format!(
                "encoder.embedding_parallelism must be 'auto' or a positive integer, got '{}'",
                self.embedding_parallelism
            ))),
            Ok(n) => Ok(Some(n)),
        }
    }
}

/// Persistent corpus embedding store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relative to the config directory
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_store_path(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCacheKind {
    None,
    #[default]
    Memory,
    Rocksdb,
}

/// Cache for embeddings of incoming questions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryCacheConfig {
    #[serde(default)]
    pub kind: QueryCacheKind,

    /// Relative to the config directory, only used by the rocksdb cache
    #[serde(default = "default_query_cache_path")]
    pub path: String,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            kind: QueryCacheKind::default(),
            path: default_query_cache_path(),
        }
    }
}

/// HNSW graph construction settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_m")]
    pub m: usize,

    /// Defaults to 1/ln(m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_lambda: Option<f64>,

    #[serde(default = "default_construction_pruning")]
    pub construction_pruning: usize,

    #[serde(default)]
    pub neighbour_heuristic: NeighbourHeuristic,

    #[serde(default = "default_true")]
    pub expand_best_selection: bool,

    #[serde(default = "default_true")]
    pub keep_pruned_connections: bool,

    #[serde(default = "default_true")]
    pub enable_distance_cache: bool,

    #[serde(default)]
    pub distance: DistanceMetric,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            m: default_m(),
            level_lambda: None,
            construction_pruning: default_construction_pruning(),
            neighbour_heuristic: NeighbourHeuristic::default(),
            expand_best_selection: true,
            keep_pruned_connections: true,
            enable_distance_cache: true,
            distance: DistanceMetric::default(),
        }
    }
}

impl HnswConfig {
    pub fn params(&self) -> HnswParams {
        HnswParams {
            m: self.m,
            level_lambda: self.level_lambda.unwrap_or_else(|| default_level_lambda(self.m)),
            construction_pruning: self.construction_pruning,
            neighbour_heuristic: self.neighbour_heuristic,
            expand_best_selection: self.expand_best_selection,
            keep_pruned_connections: self.keep_pruned_connections,
            enable_distance_cache: self.enable_distance_cache,
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_faq_config() -> String {
    DEFAULT_FAQ_CONFIG.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_uri() -> String {
    DEFAULT_API_URI.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_embedding_parallelism() -> String {
    "auto".to_string()
}

fn default_store_path() -> String {
    DEFAULT_STORE_PATH.to_string()
}

fn default_query_cache_path() -> String {
    DEFAULT_QUERY_CACHE_PATH.to_string()
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_m() -> usize {
    crate::semantic::hnsw::DEFAULT_M
}

fn default_construction_pruning() -> usize {
    crate::semantic::hnsw::DEFAULT_CONSTRUCTION_PRUNING
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Corpus file, relative to the config directory
    #[serde(default = "default_faq_config")]
    pub faq_config: String,

    /// Index one vector per answer instead of one per question
    #[serde(default)]
    pub use_q2a: bool,

    #[serde(default = "default_true")]
    pub exact_match: bool,

    /// Ignore everything but letters when matching exactly
    #[serde(default)]
    pub strip_non_letters: bool,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub embedding_store: StoreConfig,

    #[serde(default)]
    pub query_cache: QueryCacheConfig,

    #[serde(default)]
    pub hnsw: HnswConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            faq_config: default_faq_config(),
            use_q2a: false,
            exact_match: true,
            strip_non_letters: false,
            encoder: EncoderConfig::default(),
            embedding_store: StoreConfig::default(),
            query_cache: QueryCacheConfig::default(),
            hnsw: HnswConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let hnsw = &self.hnsw;
        if hnsw.m < 2 {
            return Err(ConfigError::Invalid(format!(
                "hnsw.m must be at least 2, got {}",
                hnsw.m
            )));
        }
        if hnsw.construction_pruning == 0 {
            return Err(ConfigError::Invalid(
                "hnsw.construction_pruning must be greater than 0".to_string(),
            ));
        }
        if let Some(lambda) = hnsw.level_lambda {
            if !(lambda.is_finite() && lambda > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "hnsw.level_lambda must be a positive number, got {lambda}"
                )));
            }
        }

        self.encoder.parallelism()?;

        if self.encoder.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "encoder.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.encoder.kind == EncoderKind::Api {
            url::Url::parse(&self.encoder.api_uri).map_err(|e| {
                ConfigError::Invalid(format!(
                    "encoder.api_uri '{}' is not a valid URL: {e}",
                    self.encoder.api_uri
                ))
            })?;
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE);
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(base_path).map_err(io_err)?;

        // create new if does not exist
        if !path.exists() {
            log::info!("Writing default config to {}", path.display());
            std::fs::write(&path, serde_yml::to_string(&Self::default())?).map_err(io_err)?;
        }

        let config_str = std::fs::read_to_string(&path).map_err(io_err)?;
        let mut config: Self =
            serde_yml::from_str(&config_str).map_err(|source| ConfigError::Malformed {
                path: path.clone(),
                source,
            })?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&path, config_str).map_err(|source| ConfigError::Io { path, source })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a path from the config relative to the config directory.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.base_path.join(relative)
    }

    pub fn faq_config_path(&self) -> PathBuf {
        self.resolve(&self.faq_config)
    }

    pub fn ingest_mode(&self) -> IngestMode {
        if self.use_q2a {
            IngestMode::QuestionToAnswer
        } else {
            IngestMode::QuestionToQuestion
        }
    }
}
