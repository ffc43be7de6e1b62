//! Binding - 宣言的バインディングを具体的なリソース参照へ解決する
//!
//! # フロー
//! 1. 登録時: `StaticBinding::parse("images/{name}.png", Direction::Input)`
//! 2. 起動前: `parameter_names()` で trigger が提供すべき名前を確認
//! 3. 呼び出しごと: `resolve(&TriggerInputs)` → `RuntimeBinding`
//!
//! 名前の検証は I/O の前に行う（Fail-fast）。

pub mod path;
pub mod resolver;
pub mod template;

use thiserror::Error;

pub use self::path::{BlobPath, normalize};
pub use self::resolver::{
    Direction, ParameterBindingResolver, RuntimeBinding, StaticBinding, TriggerInputs,
};
pub use self::template::BindingTemplate;

/// Binding failures. All of them surface before any storage I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("invalid binding template '{pattern}': {reason}")]
    InvalidTemplate { pattern: String, reason: String },

    #[error("no value for parameter '{name}' in binding template '{pattern}'")]
    MissingParameter { name: String, pattern: String },

    #[error("invalid container name '{name}': {reason}")]
    InvalidContainerName { name: String, reason: String },

    #[error("invalid blob name '{name}': {reason}")]
    InvalidBlobName { name: String, reason: String },

    #[error("path '{0}' must be of the form 'container/blob'")]
    IncompletePath(String),

    #[error("container-level binding '{0}' requires the triggering resource path")]
    MissingTriggerResource(String),
}
