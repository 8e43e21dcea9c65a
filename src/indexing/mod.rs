//! Bulk indexing: corpus reading, tenant assignment, batched embed + upsert,
//! and deferred index finalization.

mod corpus;
mod indexer;
mod partition;

pub use corpus::{parse_corpus, parse_document_id, read_corpus, CorpusItem};
pub use indexer::{BatchIndexer, IndexReport, IndexerState};
pub use partition::TenantPartition;
