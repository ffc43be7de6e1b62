//! CompositeListener - 全関数の listener を 1 つの start/stop にまとめる

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::fault::{FaultIsolatingListener, StartOutcome};
use super::handle::ListenerHandle;
use crate::domain::{FunctionId, HostError, ListenerError};

/// What happened when the composite started.
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    pub started: Vec<FunctionId>,
    pub faulted: Vec<(FunctionId, ListenerError)>,
}

pub struct CompositeListener {
    listeners: Vec<Arc<FaultIsolatingListener>>,
    /// Every function that was not skipped, including those whose listener
    /// could not be built.
    handles: Vec<ListenerHandle>,
    allow_partial: bool,
    stopped: AtomicBool,
}

impl CompositeListener {
    pub fn new(
        listeners: Vec<Arc<FaultIsolatingListener>>,
        handles: Vec<ListenerHandle>,
        allow_partial: bool,
    ) -> Self {
        Self {
            listeners,
            handles,
            allow_partial,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn handles(&self) -> &[ListenerHandle] {
        &self.handles
    }

    pub fn handle(&self, function: &FunctionId) -> Option<&ListenerHandle> {
        self.handles.iter().find(|h| h.function() == function)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Start every constituent concurrently.
    ///
    /// A fault never prevents the others from starting. When partial startup
    /// is disallowed the first fault is returned after everything that did
    /// start has been stopped again.
    pub async fn start(&self) -> Result<StartReport, HostError> {
        let mut set = JoinSet::new();
        for (index, listener) in self.listeners.iter().enumerate() {
            let listener = Arc::clone(listener);
            set.spawn(async move { (index, listener.start_isolated().await) });
        }

        let mut outcomes: Vec<Option<StartOutcome>> = vec![None; self.listeners.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                // start_isolated catches panics itself
                Err(err) => error!(error = %err, "listener start task failed"),
            }
        }

        let mut report = StartReport::default();
        for (listener, outcome) in self.listeners.iter().zip(outcomes) {
            let function = listener.function().clone();
            match outcome {
                Some(StartOutcome::Started) => report.started.push(function),
                Some(StartOutcome::Faulted(err)) => report.faulted.push((function, err)),
                None => report.faulted.push((
                    function,
                    ListenerError::Start("start task did not complete".to_string()),
                )),
            }
        }

        if !self.allow_partial
            && let Some((function, source)) = report.faulted.first().cloned()
        {
            error!(function = %function, error = %source, "aborting host startup: partial startup is not allowed");
            self.stop().await;
            return Err(HostError::ListenerFaulted { function, source });
        }

        info!(
            started = report.started.len(),
            faulted = report.faulted.len(),
            "host listeners started"
        );
        Ok(report)
    }

    /// Stop every constituent. Idempotent; pending lease acquisitions are
    /// cancelled.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut set = JoinSet::new();
        for listener in &self.listeners {
            let listener = Arc::clone(listener);
            set.spawn(async move { listener.stop_isolated().await });
        }
        let mut failures = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => failures += 1,
                Err(err) => {
                    failures += 1;
                    warn!(error = %err, "listener stop task failed");
                }
            }
        }
        info!(listeners = self.listeners.len(), failures, "host listeners stopped");
    }
}
