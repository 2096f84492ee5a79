//! Usage quota seam.
//!
//! Plan limits live in an external billing system. Fresh submissions ask it
//! for a unit of quota; reprocessing an existing job never does.

use async_trait::async_trait;

use crate::error::WorkerResult;

#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Consume one submission for `owner_id`. `Ok(false)` means the owner is
    /// over their limit.
    async fn try_consume(&self, owner_id: &str) -> WorkerResult<bool>;
}

/// Quota gate that admits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaGate for UnlimitedQuota {
    async fn try_consume(&self, _owner_id: &str) -> WorkerResult<bool> {
        Ok(true)
    }
}
