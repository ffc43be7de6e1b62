//! Listener port - trigger ごとの具体的な listener
//!
//! blob / queue などの具体的な listener は外部コラボレータ。host は
//! start/stop と、listener 自身が要求する singleton 指定だけを見る。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ListenerError, SingletonSpec};

/// A trigger listener for one function.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn start(&self) -> Result<(), ListenerError>;

    async fn stop(&self) -> Result<(), ListenerError>;

    /// Singleton requirement declared by the listener type itself.
    fn singleton(&self) -> Option<SingletonSpec> {
        None
    }
}

/// Builds the concrete listener of one function.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Listener>, ListenerError>;
}
