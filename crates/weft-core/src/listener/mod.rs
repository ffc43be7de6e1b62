//! Listener composition - 関数ごとの listener を 1 つのホスト listener にまとめる
//!
//! - `DisableRegistry`: 起動時に関数を除外するかどうか
//! - `FaultIsolatingListener`: 1 関数の失敗をその関数に閉じ込める
//! - `HostListenerFactory`: skip → build → singleton → fault isolation の順に組み立てる
//! - `CompositeListener`: まとめて start / stop
//! - `ListenerHandle`: 関数ごとの状態の観測

pub mod composite;
pub mod disable;
pub mod factory;
pub mod fault;
pub mod handle;

pub use self::composite::{CompositeListener, StartReport};
pub use self::disable::{DisableProvider, DisableRegistry, is_truthy};
pub use self::factory::{
    CreationSummary, HostListenerFactory, HostListenerFactoryBuilder, ListenersCreated,
};
pub use self::fault::{FaultIsolatingListener, StartOutcome};
pub use self::handle::ListenerHandle;
