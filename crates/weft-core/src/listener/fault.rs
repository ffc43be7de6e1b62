//! FaultIsolatingListener - 1 関数の失敗をその関数だけに閉じ込める
//!
//! inner の start/stop は別タスクで実行する。Err も panic も
//! `ListenerError` として記録し、ホスト全体には伝播させない
//! （allow_partial_host_startup = false の場合だけ呼び出し元へ返す）。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use super::handle::ListenerHandle;
use crate::domain::{FunctionId, ListenerError, ListenerState};
use crate::ports::Listener;

/// Result of an isolated start.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started,
    Faulted(ListenerError),
}

pub struct FaultIsolatingListener {
    inner: Arc<dyn Listener>,
    handle: ListenerHandle,
    /// Inner listener reports its own progress on the shared handle
    /// (singleton decorator), so `Ok` from start does not mean running.
    deferred: bool,
    allow_partial: bool,
}

impl FaultIsolatingListener {
    pub fn new(inner: Arc<dyn Listener>, handle: ListenerHandle, allow_partial: bool) -> Self {
        Self {
            inner,
            handle,
            deferred: false,
            allow_partial,
        }
    }

    /// Wrap a listener that drives `handle` itself.
    pub fn deferred(inner: Arc<dyn Listener>, handle: ListenerHandle, allow_partial: bool) -> Self {
        Self {
            deferred: true,
            ..Self::new(inner, handle, allow_partial)
        }
    }

    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    pub fn function(&self) -> &FunctionId {
        self.handle.function()
    }

    /// Start the inner listener; never propagates its failure.
    pub async fn start_isolated(&self) -> StartOutcome {
        if !self.handle.transition(ListenerState::Starting) {
            return match self.handle.fault() {
                Some(err) => StartOutcome::Faulted(err),
                None => StartOutcome::Started,
            };
        }

        let inner = Arc::clone(&self.inner);
        let result = flatten(tokio::spawn(async move { inner.start().await }).await);

        match result {
            Ok(()) => {
                if !self.deferred {
                    self.handle.transition(ListenerState::Running);
                }
                info!(function = %self.function(), "listener started");
                StartOutcome::Started
            }
            Err(err) => {
                error!(function = %self.function(), error = %err, "listener faulted during start; function is unavailable");
                self.handle.fault_with(err.clone());
                StartOutcome::Faulted(err)
            }
        }
    }

    /// Stop the inner listener; failures are logged and returned, never panics.
    pub async fn stop_isolated(&self) -> Result<(), ListenerError> {
        if self.handle.state() == ListenerState::Stopped {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let result = flatten(tokio::spawn(async move { inner.stop().await }).await);

        if !self.deferred {
            self.handle.transition(ListenerState::Stopped);
        }
        if let Err(err) = &result {
            warn!(function = %self.function(), error = %err, "listener failed to stop cleanly");
        }
        result
    }
}

fn flatten(joined: Result<Result<(), ListenerError>, JoinError>) -> Result<(), ListenerError> {
    match joined {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(ListenerError::Panicked(panic_message(join))),
        Err(join) => Err(ListenerError::Start(format!("listener task aborted: {join}"))),
    }
}

fn panic_message(join: JoinError) -> String {
    let payload = join.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Listener for FaultIsolatingListener {
    /// Escalates the fault only when partial startup is not allowed.
    async fn start(&self) -> Result<(), ListenerError> {
        match self.start_isolated().await {
            StartOutcome::Started => Ok(()),
            StartOutcome::Faulted(_) if self.allow_partial => Ok(()),
            StartOutcome::Faulted(err) => Err(err),
        }
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.stop_isolated().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl Listener for Failing {
        async fn start(&self) -> Result<(), ListenerError> {
            Err(ListenerError::Start("queue not found".into()))
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Listener for Panicking {
        async fn start(&self) -> Result<(), ListenerError> {
            panic!("listener exploded");
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting {
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Listener for Counting {
        async fn start(&self) -> Result<(), ListenerError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wrap(inner: Arc<dyn Listener>, allow_partial: bool) -> FaultIsolatingListener {
        FaultIsolatingListener::new(inner, ListenerHandle::new(FunctionId::new("F")), allow_partial)
    }

    #[tokio::test]
    async fn start_error_is_recorded_not_raised() {
        let listener = wrap(Arc::new(Failing), true);
        assert!(matches!(
            listener.start_isolated().await,
            StartOutcome::Faulted(ListenerError::Start(_))
        ));
        assert_eq!(listener.handle().state(), ListenerState::Faulted);
        assert!(listener.start().await.is_ok());
    }

    #[tokio::test]
    async fn panic_is_captured_as_fault() {
        let listener = wrap(Arc::new(Panicking), true);
        let StartOutcome::Faulted(ListenerError::Panicked(message)) = listener.start_isolated().await
        else {
            panic!("expected captured panic");
        };
        assert!(message.contains("listener exploded"));
        assert_eq!(listener.handle().state(), ListenerState::Faulted);
    }

    #[tokio::test]
    async fn fault_escalates_when_partial_startup_disallowed() {
        let listener = wrap(Arc::new(Failing), false);
        assert!(matches!(listener.start().await, Err(ListenerError::Start(_))));
    }

    #[tokio::test]
    async fn stop_runs_once() {
        let inner = Arc::new(Counting::default());
        let listener = wrap(inner.clone(), false);
        listener.start().await.unwrap();
        assert_eq!(listener.handle().state(), ListenerState::Running);

        listener.stop().await.unwrap();
        listener.stop().await.unwrap();
        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);
        assert_eq!(listener.handle().state(), ListenerState::Stopped);
    }
}
