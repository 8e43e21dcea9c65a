//! Hybrid Query Orchestrator
//!
//! Dense and sparse prefetch under one tenant filter, fused by the storage
//! engine and reranked with late-interaction MaxSim.

mod hybrid;

pub use hybrid::HybridSearcher;

use crate::store::{MatchFilter, PointId, ScoredPoint};
use serde::{Deserialize, Serialize};

/// Tenant scope of a search
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TenantFilter {
    /// Cross-tenant search over the whole collection
    #[default]
    None,
    TenantEquals(String),
}

impl TenantFilter {
    /// `Some(id)` becomes a tenant filter; blank ids count as absent
    pub fn from_option(tenant: Option<String>) -> Self {
        match tenant {
            Some(id) if !id.trim().is_empty() => TenantFilter::TenantEquals(id),
            _ => TenantFilter::None,
        }
    }

    /// Storage filter expression on `field`
    pub fn resolve(&self, field: &str) -> Option<MatchFilter> {
        match self {
            TenantFilter::None => None,
            TenantFilter::TenantEquals(value) => Some(MatchFilter {
                field: field.to_string(),
                value: value.clone(),
            }),
        }
    }
}

/// Search query with optional tenant filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,

    #[serde(default)]
    pub tenant: TenantFilter,

    /// Candidates per prefetch; configured default when absent
    pub prefetch_limit: Option<u64>,

    /// Maximum results after rerank; configured default when absent
    pub final_limit: Option<u64>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant: TenantFilter::None,
            prefetch_limit: None,
            final_limit: None,
        }
    }

    pub fn for_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = TenantFilter::TenantEquals(tenant.into());
        self
    }

    pub fn with_limits(mut self, prefetch_limit: u64, final_limit: u64) -> Self {
        self.prefetch_limit = Some(prefetch_limit);
        self.final_limit = Some(final_limit);
        self
    }
}

/// One ranked document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: PointId,
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl From<ScoredPoint> for SearchHit {
    fn from(point: ScoredPoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            payload: point.payload,
        }
    }
}

/// Results in descending score order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub results: Vec<SearchHit>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
