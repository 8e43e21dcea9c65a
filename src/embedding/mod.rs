//! Embedding Gateway
//!
//! Wraps the three embedding providers behind one contract:
//! `embed(text, role) -> {dense, sparse, multivector}`.
//! Architecture:
//! - `DenseProvider` / `SparseProvider` / `LateInteractionProvider` traits
//! - FastEmbed for dense and sparse (local ONNX models)
//! - OpenAI-style HTTP endpoint for late-interaction token vectors
//! - `EmbeddingGateway` runs the three concurrently and refuses partial results

mod gateway;
mod late_interaction;
mod provider;

pub use gateway::EmbeddingGateway;
pub use late_interaction::HttpLateInteractionProvider;
pub use provider::{
    DenseProvider, EmbeddingError, FastEmbedDense, FastEmbedSparse, LateInteractionProvider,
    SparseProvider,
};

use crate::store::SparseVector;
use serde::{Deserialize, Serialize};

/// Whether text is embedded as a search query or as an indexed passage.
/// Selects prompt templates only; output dimensionality never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedRole {
    Query,
    Passage,
}

impl EmbedRole {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbedRole::Query => "query",
            EmbedRole::Passage => "passage",
        }
    }
}

/// All three representations of one text
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub multivector: Vec<Vec<f32>>,
}

/// Passage representations computed at load time.
///
/// `multivector` is `None` when the collection defers late-interaction
/// vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageEmbeddings {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub multivector: Option<Vec<Vec<f32>>>,
}
