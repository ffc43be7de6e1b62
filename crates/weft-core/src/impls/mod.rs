//! Impls - ports の開発用・テスト用実装
//!
//! # 含まれる実装
//! - **InMemoryLeaseStore**: 単一プロセス内で複数ホストを模擬する lease store
//! - **EnvSettings**: 環境変数から設定値を読む
//! - **MapSettings**: テスト用の固定 map
//!
//! 本番用の lease store（blob lease、Redis など）は別クレートで実装する。

pub mod inmem_lease;
pub mod settings;

pub use self::inmem_lease::InMemoryLeaseStore;
pub use self::settings::{EnvSettings, MapSettings};
