//! Configuration management for Trilane
//!
//! Everything the retrieval engine needs is a startup constant: collection
//! layout, model names, batch sizes and search limits. The file is TOML,
//! environment variables may override individual keys, and the merged result
//! is validated once before anything touches the storage engine.

use crate::error::{Result, TrilaneError};
use crate::store::Quantization;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub service: ServiceConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Which storage engine binding to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Qdrant,
    /// In-process engine, for dry runs and tests
    Memory,
}

/// Storage engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: String,
    /// Name of the environment variable holding the API key, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

/// Dense vector space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseSpaceConfig {
    pub name: String,
    pub size: u64,
    pub quantization: Quantization,
    pub always_ram: bool,
    pub on_disk: bool,
}

/// Sparse vector space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseSpaceConfig {
    pub name: String,
    pub idf: bool,
}

/// Late-interaction (multivector) space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultivectorSpaceConfig {
    pub name: String,
    pub size: u64,
}

/// Collection layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub shard_number: u32,
    pub replication_factor: u32,
    pub dense: DenseSpaceConfig,
    pub sparse: SparseSpaceConfig,
    pub late_interaction: MultivectorSpaceConfig,
    /// Graph fan-out restored on the dense space once bulk load completes
    pub hnsw_m: u64,
    pub tenant_field: String,
    /// Payload fields returned with search results
    pub payload_fields: Vec<String>,
    /// Fail instead of warning when an existing collection differs
    pub strict_schema: bool,
    /// Whether passage multivectors are computed during bulk load
    pub multivector_at_load: bool,
}

/// Late-interaction provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateInteractionProviderConfig {
    pub model: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

/// Embedding providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dense_model: String,
    pub sparse_model: String,
    pub late_interaction: LateInteractionProviderConfig,
    /// Instruction prepended to dense queries
    #[serde(default)]
    pub query_prefix: String,
    #[serde(default)]
    pub passage_prefix: String,
}

/// Bulk load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub corpus_path: PathBuf,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub num_tenants: usize,
    /// Prefix stripped from source keys before parsing the numeric id
    pub id_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_documents: Option<usize>,
    pub upsert_wait: bool,
}

/// Query limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub prefetch_limit: u64,
    pub rerank_limit: u64,
}

/// HTTP facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub listen_addr: String,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrilaneError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TrilaneError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TrilaneError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TRILANE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `TRILANE_`-prefixed overrides from an arbitrary source
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("TRILANE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__BACKEND" => {
                self.storage.backend = match value {
                    "qdrant" => StorageBackend::Qdrant,
                    "memory" => StorageBackend::Memory,
                    other => {
                        return Err(TrilaneError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Unknown storage backend '{}'", other),
                        })
                    }
                };
            }
            "STORAGE__URL" => self.storage.url = value.to_string(),
            "STORAGE__TIMEOUT_SECS" => self.storage.timeout_secs = parse_env(path, value)?,
            "COLLECTION__NAME" => self.collection.name = value.to_string(),
            "COLLECTION__SHARD_NUMBER" => self.collection.shard_number = parse_env(path, value)?,
            "COLLECTION__REPLICATION_FACTOR" => {
                self.collection.replication_factor = parse_env(path, value)?
            }
            "COLLECTION__STRICT_SCHEMA" => {
                self.collection.strict_schema = parse_env(path, value)?
            }
            "COLLECTION__MULTIVECTOR_AT_LOAD" => {
                self.collection.multivector_at_load = parse_env(path, value)?
            }
            "EMBEDDING__DENSE_MODEL" => self.embedding.dense_model = value.to_string(),
            "EMBEDDING__SPARSE_MODEL" => self.embedding.sparse_model = value.to_string(),
            "EMBEDDING__LATE_INTERACTION_ENDPOINT" => {
                self.embedding.late_interaction.endpoint = value.to_string()
            }
            "INDEXING__CORPUS_PATH" => self.indexing.corpus_path = PathBuf::from(value),
            "INDEXING__BATCH_SIZE" => self.indexing.batch_size = parse_env(path, value)?,
            "INDEXING__MAX_CONCURRENT_BATCHES" => {
                self.indexing.max_concurrent_batches = parse_env(path, value)?
            }
            "INDEXING__UPSERT_WAIT" => self.indexing.upsert_wait = parse_env(path, value)?,
            "INDEXING__NUM_TENANTS" => self.indexing.num_tenants = parse_env(path, value)?,
            "INDEXING__MAX_DOCUMENTS" => {
                self.indexing.max_documents = Some(parse_env(path, value)?)
            }
            "SEARCH__PREFETCH_LIMIT" => self.search.prefetch_limit = parse_env(path, value)?,
            "SEARCH__RERANK_LIMIT" => self.search.rerank_limit = parse_env(path, value)?,
            "SERVICE__LISTEN_ADDR" => self.service.listen_addr = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TrilaneError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("trilane").join("config.toml"))
    }

    /// Resolve the storage API key from the configured environment variable
    pub fn storage_api_key(&self) -> Option<String> {
        self.storage
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| TrilaneError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Qdrant,
                url: "http://localhost:6334".to_string(),
                api_key_env: None,
                timeout_secs: 500,
            },
            collection: CollectionConfig {
                name: "beir_nq".to_string(),
                shard_number: 3,
                replication_factor: 2,
                dense: DenseSpaceConfig {
                    name: "dense_vector".to_string(),
                    size: 1024,
                    quantization: Quantization::Binary,
                    always_ram: true,
                    on_disk: true,
                },
                sparse: SparseSpaceConfig {
                    name: "sparse_vector".to_string(),
                    idf: true,
                },
                late_interaction: MultivectorSpaceConfig {
                    name: "late_interaction_vector".to_string(),
                    size: 128,
                },
                hnsw_m: 16,
                tenant_field: "user_id".to_string(),
                payload_fields: vec![
                    "title".to_string(),
                    "user_id".to_string(),
                    "text".to_string(),
                ],
                strict_schema: true,
                multivector_at_load: true,
            },
            embedding: EmbeddingConfig {
                dense_model: "BAAI/bge-large-en-v1.5".to_string(),
                sparse_model: "prithivida/Splade_PP_en_v1".to_string(),
                late_interaction: LateInteractionProviderConfig {
                    model: "colbert-ir/colbertv2.0".to_string(),
                    endpoint: "http://localhost:7997/embeddings".to_string(),
                    api_key_env: None,
                    timeout_secs: 60,
                },
                query_prefix: "Represent this sentence for searching relevant passages: "
                    .to_string(),
                passage_prefix: String::new(),
            },
            indexing: IndexingConfig {
                corpus_path: PathBuf::from("corpus.jsonl"),
                batch_size: 5,
                max_concurrent_batches: 1,
                num_tenants: 10,
                id_prefix: "doc".to_string(),
                max_documents: Some(1_000_000),
                upsert_wait: false,
            },
            search: SearchConfig {
                prefetch_limit: 50,
                rerank_limit: 10,
            },
            service: ServiceConfig {
                listen_addr: "0.0.0.0:8000".to_string(),
            },
        }
    }
}
