//! InMemoryLeaseStore - 開発用の lease store
//!
//! # 実装詳細
//! - HashMap<String, Lease> を tokio Mutex で保護（操作ごとに lock、await を跨がない）
//! - 期限判定は注入された Clock で行う
//! - `set_available(false)` で障害を模擬できる

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{HolderId, Lease};
use crate::ports::{Clock, LeaseStore, LeaseStoreError, SystemClock};

pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<String, Lease>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable` while off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The live lease for `key`, if any.
    pub async fn current(&self, key: &str) -> Option<Lease> {
        let now = self.clock.now();
        let leases = self.leases.lock().await;
        leases
            .get(key)
            .filter(|lease| !lease.is_expired_at(now))
            .cloned()
    }

    fn ensure_available(&self) -> Result<(), LeaseStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LeaseStoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ))
        }
    }

    fn expiry(&self, ttl: Duration) -> Result<chrono::DateTime<chrono::Utc>, LeaseStoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LeaseStoreError::Rejected(format!("ttl out of range: {e}")))?;
        Ok(self.clock.now() + ttl)
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Option<Lease>, LeaseStoreError> {
        self.ensure_available()?;
        let expires_at = self.expiry(ttl)?;
        let now = self.clock.now();

        let mut leases = self.leases.lock().await;
        if let Some(existing) = leases.get(key)
            && !existing.is_expired_at(now)
            && existing.holder != *holder
        {
            return Ok(None);
        }

        let lease = Lease::new(key, *holder, expires_at);
        leases.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Option<Lease>, LeaseStoreError> {
        self.ensure_available()?;
        let expires_at = self.expiry(ttl)?;
        let now = self.clock.now();

        let mut leases = self.leases.lock().await;
        match leases.get_mut(&lease.key) {
            Some(existing) if existing.holder == lease.holder && !existing.is_expired_at(now) => {
                existing.expires_at = expires_at;
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), LeaseStoreError> {
        self.ensure_available()?;
        let mut leases = self.leases.lock().await;
        if leases
            .get(&lease.key)
            .is_some_and(|existing| existing.holder == lease.holder)
        {
            leases.remove(&lease.key);
        }
        Ok(())
    }
}
