/// Embedding provider traits and FastEmbed implementations
use super::EmbedRole;
use crate::error::TrilaneError;
use crate::store::SparseVector;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, SparseInitOptions, SparseModel, SparseTextEmbedding,
    TextEmbedding,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed ({model}): {reason}")]
    InitializationError { model: String, reason: String },

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<EmbeddingError> for TrilaneError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::InitializationError { model, reason } => {
                TrilaneError::ModelUnavailable { model, reason }
            }
            other => TrilaneError::EmbeddingFailed(other.to_string()),
        }
    }
}

/// Fixed-dimension semantic embeddings
#[async_trait]
pub trait DenseProvider: Send + Sync {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Lexical (index, weight) embeddings
#[async_trait]
pub trait SparseProvider: Send + Sync {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        role: EmbedRole,
    ) -> Result<Vec<SparseVector>, EmbeddingError>;

    fn model_name(&self) -> &str;
}

/// Per-token embeddings for MaxSim scoring
#[async_trait]
pub trait LateInteractionProvider: Send + Sync {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        role: EmbedRole,
    ) -> Result<Vec<Vec<Vec<f32>>>, EmbeddingError>;

    /// Dimension of every token vector
    fn token_dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

pub(crate) fn reject_empty(texts: &[String]) -> Result<(), EmbeddingError> {
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::InvalidInput(format!(
            "Empty text at position {}",
            pos
        )));
    }
    Ok(())
}

/// FastEmbed dense provider
///
/// **Important**: Models are downloaded on-demand to the fastembed cache on
/// first use. bge-large-en-v1.5 is ~1.3GB.
pub struct FastEmbedDense {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedDense {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
            "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
                (EmbeddingModel::AllMiniLML6V2, 384)
            }
            _ => {
                return Err(EmbeddingError::InitializationError {
                    model: model_name.to_string(),
                    reason: "Unsupported dense model. Supported: bge-large-en-v1.5, \
                             bge-base-en-v1.5, bge-small-en-v1.5, all-MiniLM-L6-v2"
                        .to_string(),
                });
            }
        };

        tracing::info!(
            "Initializing dense embedding model: {} ({}D)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model =
            TextEmbedding::try_new(init_options).map_err(|e| EmbeddingError::InitializationError {
                model: model_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl DenseProvider for FastEmbedDense {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        _role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_empty(&texts)?;

        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// FastEmbed sparse (SPLADE) provider
pub struct FastEmbedSparse {
    model: Arc<SparseTextEmbedding>,
    model_name: String,
}

impl FastEmbedSparse {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let sparse_model = match model_name {
            "prithivida/Splade_PP_en_v1" | "splade-pp-en-v1" => SparseModel::SPLADEPPV1,
            _ => {
                return Err(EmbeddingError::InitializationError {
                    model: model_name.to_string(),
                    reason: "Unsupported sparse model. Supported: prithivida/Splade_PP_en_v1"
                        .to_string(),
                });
            }
        };

        tracing::info!("Initializing sparse embedding model: {}", model_name);

        let init_options = SparseInitOptions::new(sparse_model).with_show_download_progress(true);
        let model = SparseTextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::InitializationError {
                model: model_name.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl SparseProvider for FastEmbedSparse {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        _role: EmbedRole,
    ) -> Result<Vec<SparseVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_empty(&texts)?;

        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        Ok(embeddings
            .into_iter()
            .map(|e| {
                SparseVector::new(
                    e.indices.into_iter().map(|i| i as u32).collect(),
                    e.values,
                )
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
