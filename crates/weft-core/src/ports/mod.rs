//! Ports - 外部コラボレータの抽象化
//!
//! 各 trait は host の外側にあるもの（lease store、具体的な trigger listener、
//! 設定値の取得元、時刻）へのインターフェースを提供し、実装の詳細を隠蔽する。
//!
//! # 設計原則
//! - lease store への調整は compare-and-swap のみ（上に独自ロックを重ねない）
//! - 時刻は Clock 経由で取得し、テストで差し替え可能にする

pub mod clock;
pub mod lease_store;
pub mod listener;
pub mod settings;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::lease_store::{LeaseStore, LeaseStoreError};
pub use self::listener::{Listener, ListenerFactory};
pub use self::settings::Settings;
