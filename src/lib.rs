//! Trilane - Multi-tenant hybrid retrieval
//!
//! Indexes a corpus into a vector store with three representations per
//! document (dense, sparse, late-interaction multivector), then answers
//! tenant-scoped queries by prefetching candidates with the dense and sparse
//! vectors and reranking them with MaxSim over the multivectors.

pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod retrieval;
pub mod schema;
pub mod service;
pub mod store;

pub use error::{Result, TrilaneError};
