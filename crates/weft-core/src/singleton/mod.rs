//! Singleton - fleet 全体で「同時に高々 1 つ」を保証する
//!
//! - `SingletonManager`: lease の acquire / renew / hold / release
//! - `SingletonListener`: listener lock を保持している間だけ listener を動かす decorator
//!
//! lease store 上の compare-and-swap 以外のロックは重ねない。

pub mod listener;
pub mod manager;

pub use self::listener::SingletonListener;
pub use self::manager::{
    AcquireOutcome, ExclusiveOutcome, HoldOutcome, LeaseLoss, RenewOutcome, SingletonManager,
};
