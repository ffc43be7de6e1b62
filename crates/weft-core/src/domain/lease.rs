//! Lease: time-bounded exclusive ownership of a key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::HolderId;

/// A lease as granted by the lease store.
///
/// Invariant (enforced by the store): for a given key at most one non-expired
/// lease exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub key: String,
    pub holder: HolderId,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(key: impl Into<String>, holder: HolderId, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            holder,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
