//! weft-core
//!
//! Core building blocks for the Weft function host.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, function, lease, state, job, errors）
//! - **ports**: 外部コラボレータの抽象化（LeaseStore, Listener, ListenerFactory, Clock, Settings）
//! - **binding**: 宣言的バインディングの解決（BindingTemplate, ParameterBindingResolver）
//! - **singleton**: lease による fleet 全体での排他（SingletonManager, SingletonListener）
//! - **listener**: 関数ごとの listener を束ねる（HostListenerFactory, CompositeListener）
//! - **impls**: ports の開発用実装（InMemoryLeaseStore, EnvSettings, MapSettings）
//! - **config**: ホスト設定（HostConfig, SingletonConfig）
//! - **backoff**: 待機間隔の計算（BackoffPolicy）
//! - **shutdown**: 待機ループ共通のキャンセル信号（watch channel）

pub mod backoff;
pub mod binding;
pub mod config;
pub mod domain;
pub mod impls;
pub mod listener;
pub mod ports;
pub mod shutdown;
pub mod singleton;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, HostConfig, SingletonConfig};
pub use domain::{
    DisableMarker, FunctionDescriptor, FunctionId, HostError, JobFailure, JobInstance,
    JobInstanceId, JobStatus, Lease, ListenerError, ListenerState, SingletonMode, SingletonSpec,
};
pub use listener::{CompositeListener, CreationSummary, HostListenerFactory, ListenerHandle};
pub use ports::{LeaseStore, Listener, ListenerFactory, Settings};
pub use singleton::SingletonManager;
