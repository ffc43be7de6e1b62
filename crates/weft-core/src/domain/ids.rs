//! Strongly-typed identifiers.
//!
//! # ULID ベースの ID
//! lease holder や listener の識別子は ULID で生成する。ホスト間で調整なしに
//! 生成でき、生成順でソートできる。
//!
//! `Id<T>` は PhantomData のマーカーで型だけを区別する。`HolderId` と
//! `ListenerId` は同じ 16 bytes だが、取り違えるとコンパイルエラーになる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the display prefix of an id type.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` (e.g. "holder-").
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the current wall-clock time plus randomness.
    pub fn generate() -> Self {
        let timestamp_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型
// ========================================

/// Lease holder marker. A fresh holder is minted per acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Holder {}

impl IdMarker for Holder {
    fn prefix() -> &'static str {
        "holder-"
    }
}

/// Listener marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Listener {}

impl IdMarker for Listener {
    fn prefix() -> &'static str {
        "listener-"
    }
}

/// Identity of a lease holder (a host instance).
pub type HolderId = Id<Holder>;

/// Identity of one listener built by the host.
pub type ListenerId = Id<Listener>;
