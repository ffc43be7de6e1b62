//! LeaseStore port - 名前付き lease の取得・更新・解放
//!
//! fleet 全体で共有される唯一の可変リソース。すべての操作は atomic で、
//! 「存在しない、または期限切れなら取得」という compare-and-swap を前提とする。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{HolderId, Lease};

/// Lease store failure (not "lease is taken"; that is `Ok(None)`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseStoreError {
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    #[error("lease store rejected the request: {0}")]
    Rejected(String),
}

/// Distributed coordination port for exclusive leases keyed by string.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Acquire `key` for `holder` if no live lease exists (or the live lease
    /// already belongs to `holder`). Returns `None` when someone else holds it.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Option<Lease>, LeaseStoreError>;

    /// Extend `lease`. Returns `None` when ownership changed or the lease
    /// expired before the renewal arrived.
    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Option<Lease>, LeaseStoreError>;

    /// Release `lease` with compare-and-delete semantics; releasing a lease
    /// that is no longer ours is a no-op.
    async fn release(&self, lease: &Lease) -> Result<(), LeaseStoreError>;
}
