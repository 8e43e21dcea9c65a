/// Deterministic tenant assignment over a corpus of known size.
///
/// The corpus of `total` documents is cut into `tenants` contiguous blocks of
/// `max(total / tenants, 1)` documents; any remainder lands in the last
/// tenant. Assignment depends only on the global ordinal, so batch order and
/// concurrency never change it.
use crate::error::{Result, TrilaneError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantPartition {
    total: usize,
    tenants: usize,
    block: usize,
}

impl TenantPartition {
    pub fn new(total: usize, tenants: usize) -> Result<Self> {
        if tenants == 0 {
            return Err(TrilaneError::InvalidConfigValue {
                path: "indexing.num_tenants".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            total,
            tenants,
            block: (total / tenants).max(1),
        })
    }

    /// Tenant index in `[0, tenants)` for a global document ordinal
    pub fn tenant_of(&self, ordinal: usize) -> usize {
        (ordinal / self.block).min(self.tenants - 1)
    }

    /// Tenant identifier stored in the payload, e.g. `user_3`
    pub fn tenant_id(&self, ordinal: usize) -> String {
        format!("user_{}", self.tenant_of(ordinal))
    }

    /// Number of distinct tenants that actually receive documents
    pub fn populated_tenants(&self) -> usize {
        self.total.min(self.tenants)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
