//! Uniform access to the three embedding providers

use super::{
    DenseProvider, EmbedRole, Embeddings, FastEmbedDense, FastEmbedSparse,
    HttpLateInteractionProvider, LateInteractionProvider, PassageEmbeddings, SparseProvider,
};
use crate::config::{CollectionConfig, EmbeddingConfig};
use crate::error::{Result, TrilaneError};
use std::sync::Arc;
use tracing::debug;

/// Embedding Gateway
///
/// Owns one instance of each provider. Cheap to clone; clones share models.
#[derive(Clone)]
pub struct EmbeddingGateway {
    dense: Arc<dyn DenseProvider>,
    sparse: Arc<dyn SparseProvider>,
    late: Arc<dyn LateInteractionProvider>,
    query_prefix: String,
    passage_prefix: String,
}

impl EmbeddingGateway {
    pub fn new(
        dense: Arc<dyn DenseProvider>,
        sparse: Arc<dyn SparseProvider>,
        late: Arc<dyn LateInteractionProvider>,
    ) -> Self {
        Self {
            dense,
            sparse,
            late,
            query_prefix: String::new(),
            passage_prefix: String::new(),
        }
    }

    /// Prompt templates prepended to dense inputs per role
    pub fn with_prefixes(
        mut self,
        query_prefix: impl Into<String>,
        passage_prefix: impl Into<String>,
    ) -> Self {
        self.query_prefix = query_prefix.into();
        self.passage_prefix = passage_prefix.into();
        self
    }

    /// Initialize every provider named in the configuration.
    ///
    /// Fails with `ModelUnavailable` if any provider cannot start; there is no
    /// degraded mode with fewer representations.
    pub fn from_config(embedding: &EmbeddingConfig, collection: &CollectionConfig) -> Result<Self> {
        let dense = FastEmbedDense::new(&embedding.dense_model)?;
        if dense.dimension() as u64 != collection.dense.size {
            return Err(TrilaneError::Config(format!(
                "Dense model {} produces {}D vectors but collection.dense.size is {}",
                embedding.dense_model,
                dense.dimension(),
                collection.dense.size
            )));
        }
        let sparse = FastEmbedSparse::new(&embedding.sparse_model)?;
        let late = HttpLateInteractionProvider::new(
            &embedding.late_interaction,
            collection.late_interaction.size as usize,
        )?;

        Ok(Self::new(Arc::new(dense), Arc::new(sparse), Arc::new(late))
            .with_prefixes(&embedding.query_prefix, &embedding.passage_prefix))
    }

    fn dense_inputs(&self, texts: &[String], role: EmbedRole) -> Vec<String> {
        let prefix = match role {
            EmbedRole::Query => &self.query_prefix,
            EmbedRole::Passage => &self.passage_prefix,
        };
        texts.iter().map(|t| format!("{}{}", prefix, t)).collect()
    }

    /// Embed one text into all three representations
    pub async fn embed(&self, text: &str, role: EmbedRole) -> Result<Embeddings> {
        let texts = vec![text.to_string()];
        let dense_inputs = self.dense_inputs(&texts, role);

        let (dense, sparse, late) = tokio::join!(
            self.dense.embed_batch(dense_inputs, role),
            self.sparse.embed_batch(texts.clone(), role),
            self.late.embed_batch(texts, role),
        );

        let dense = dense?.into_iter().next().ok_or_else(|| missing("dense"))?;
        let sparse = sparse?.into_iter().next().ok_or_else(|| missing("sparse"))?;
        let multivector = late?
            .into_iter()
            .next()
            .filter(|tokens| !tokens.is_empty())
            .ok_or_else(|| missing("late interaction"))?;

        debug!(
            "Embedded {} text: dense={}D sparse={} terms multivector={} tokens",
            role.as_str(),
            dense.len(),
            sparse.indices.len(),
            multivector.len()
        );

        Ok(Embeddings {
            dense,
            sparse,
            multivector,
        })
    }

    /// Embed a batch of passages for bulk load
    pub async fn embed_passages(
        &self,
        texts: Vec<String>,
        with_multivector: bool,
    ) -> Result<Vec<PassageEmbeddings>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let count = texts.len();
        let role = EmbedRole::Passage;
        let dense_inputs = self.dense_inputs(&texts, role);

        let late = async {
            if with_multivector {
                self.late.embed_batch(texts.clone(), role).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (dense, sparse, late) = tokio::join!(
            self.dense.embed_batch(dense_inputs, role),
            self.sparse.embed_batch(texts.clone(), role),
            late,
        );
        let dense = dense?;
        let sparse = sparse?;
        let late = late?;

        check_count("dense", count, dense.len())?;
        check_count("sparse", count, sparse.len())?;
        if let Some(late) = &late {
            check_count("late interaction", count, late.len())?;
        }

        let mut late = late.map(|v| v.into_iter());
        Ok(dense
            .into_iter()
            .zip(sparse)
            .map(|(dense, sparse)| PassageEmbeddings {
                dense,
                sparse,
                multivector: late.as_mut().and_then(|it| it.next()),
            })
            .collect())
    }

    pub fn dense_dimension(&self) -> usize {
        self.dense.dimension()
    }

    pub fn token_dimension(&self) -> usize {
        self.late.token_dimension()
    }

    /// Model names as (dense, sparse, late interaction)
    pub fn model_names(&self) -> (&str, &str, &str) {
        (
            self.dense.model_name(),
            self.sparse.model_name(),
            self.late.model_name(),
        )
    }
}

fn missing(kind: &str) -> TrilaneError {
    TrilaneError::EmbeddingFailed(format!("{} provider returned no vector", kind))
}

fn check_count(kind: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(TrilaneError::EmbeddingFailed(format!(
            "{} embedding count mismatch: expected {}, got {}",
            kind, expected, actual
        )));
    }
    Ok(())
}
