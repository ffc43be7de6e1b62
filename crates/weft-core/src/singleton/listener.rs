//! SingletonListener - lease を保持している間だけ内側の listener を動かす
//!
//! start() はすぐに返る。実際の起動はバックグラウンドタスクで行う:
//! acquire の直後から hold（定期更新）を始め、それと並行して inner.start() を
//! 呼ぶ。起動中に lease を失ったら起動を打ち切り、inner を止めて Faulted にする。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::manager::{AcquireOutcome, HoldOutcome, SingletonManager};
use crate::domain::{FunctionId, ListenerError, ListenerState};
use crate::listener::ListenerHandle;
use crate::ports::Listener;

/// Decorator deferring the inner listener's start until the listener lock
/// is held, and stopping it as soon as the lock is lost.
pub struct SingletonListener {
    inner: Arc<dyn Listener>,
    manager: Arc<SingletonManager>,
    key: String,
    handle: ListenerHandle,
    started: AtomicBool,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SingletonListener {
    pub fn new(
        inner: Arc<dyn Listener>,
        manager: Arc<SingletonManager>,
        key: impl Into<String>,
        handle: ListenerHandle,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner,
            manager,
            key: key.into(),
            handle,
            started: AtomicBool::new(false),
            cancel,
            task: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    pub fn state(&self) -> ListenerState {
        self.handle.state()
    }
}

#[async_trait]
impl Listener for SingletonListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // stop() already ran
        if *self.cancel.borrow() {
            return Ok(());
        }
        self.handle.transition(ListenerState::Starting);

        let run = Run {
            inner: Arc::clone(&self.inner),
            manager: Arc::clone(&self.manager),
            key: self.key.clone(),
            period: self.manager.config().listener_lock_period,
            handle: self.handle.clone(),
        };
        let cancel = self.cancel.subscribe();
        let join = tokio::spawn(run.run(cancel));
        *self.task.lock().await = Some(join);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.send_replace(true);

        let join = self.task.lock().await.take();
        match join {
            Some(join) => join
                .await
                .map_err(|e| ListenerError::Panicked(format!("singleton task: {e}"))),
            None => {
                self.handle.transition(ListenerState::Stopped);
                Ok(())
            }
        }
    }
}

struct Run {
    inner: Arc<dyn Listener>,
    manager: Arc<SingletonManager>,
    key: String,
    period: Duration,
    handle: ListenerHandle,
}

impl Run {
    fn function(&self) -> &FunctionId {
        self.handle.function()
    }

    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let lease = match self.manager.acquire(&self.key, self.period, &mut cancel).await {
            AcquireOutcome::Acquired(lease) => lease,
            AcquireOutcome::Cancelled => {
                self.handle.transition(ListenerState::Stopped);
                return;
            }
            AcquireOutcome::TimedOut => {
                error!(function = %self.function(), key = %self.key, "timed out waiting for singleton lock");
                self.handle
                    .fault_with(ListenerError::Start(format!("timed out acquiring lock '{}'", self.key)));
                return;
            }
        };

        // renewal starts with the lease, so a slow inner start can not let it
        // lapse underneath us
        let acquired = lease.clone();
        let hold = self.manager.hold(lease, self.period, &mut cancel);
        tokio::pin!(hold);

        let outcome = tokio::select! {
            started = self.inner.start() => match started {
                Ok(()) => {
                    self.handle.transition(ListenerState::Running);
                    info!(function = %self.function(), key = %self.key, "singleton listener running");
                    (&mut hold).await
                }
                Err(err) => {
                    error!(function = %self.function(), error = %err, "singleton listener failed to start");
                    self.manager.release(&acquired).await;
                    self.handle.fault_with(err);
                    return;
                }
            },
            outcome = &mut hold => {
                warn!(function = %self.function(), key = %self.key, "singleton lock ended while the listener was starting");
                outcome
            }
        };

        match outcome {
            HoldOutcome::Cancelled(lease) => {
                if let Err(err) = self.inner.stop().await {
                    warn!(function = %self.function(), error = %err, "listener stop failed");
                }
                self.manager.release(&lease).await;
                self.handle.transition(ListenerState::Stopped);
                info!(function = %self.function(), "singleton listener stopped");
            }
            HoldOutcome::Lost(loss) => {
                // exclusivity is gone: stop before anything else is dispatched
                if let Err(err) = self.inner.stop().await {
                    warn!(function = %self.function(), error = %err, "listener stop failed");
                }
                error!(function = %self.function(), reason = %loss, "singleton listener stopped after losing its lock");
                self.handle.fault_with(ListenerError::Start(format!("singleton lock lost: {loss}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::config::SingletonConfig;
    use crate::impls::InMemoryLeaseStore;
    use crate::ports::LeaseStore;
    use crate::singleton::testing::{StallingStore, TokioClock};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recording {
        start_delay: Duration,
        starts: AtomicUsize,
        stops: AtomicUsize,
        running: AtomicBool,
    }

    impl Recording {
        fn slow(start_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                start_delay,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl Listener for Recording {
        async fn start(&self) -> Result<(), ListenerError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if !self.start_delay.is_zero() {
                tokio::time::sleep(self.start_delay).await;
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(period: Duration) -> SingletonConfig {
        SingletonConfig {
            listener_lock_period: period,
            acquire_backoff: BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(1)),
            ..SingletonConfig::default()
        }
    }

    fn singleton(store: Arc<dyn LeaseStore>, inner: Arc<Recording>) -> SingletonListener {
        singleton_with_period(store, inner, Duration::from_secs(30))
    }

    fn singleton_with_period(
        store: Arc<dyn LeaseStore>,
        inner: Arc<Recording>,
        period: Duration,
    ) -> SingletonListener {
        let manager = Arc::new(SingletonManager::new(store, config(period), "fleet"));
        let function = FunctionId::new("Acme.Sweep");
        SingletonListener::new(
            inner,
            manager,
            "fleet/Acme.Sweep.Listener",
            ListenerHandle::new(function),
        )
    }

    async fn wait_for(listener: &SingletonListener, state: ListenerState) {
        let mut rx = listener.handle().subscribe();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_instance_runs_until_the_first_releases() {
        let store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let inner_a = Arc::new(Recording::default());
        let inner_b = Arc::new(Recording::default());
        let a = singleton(Arc::clone(&store), Arc::clone(&inner_a));
        let b = singleton(Arc::clone(&store), Arc::clone(&inner_b));

        a.start().await.unwrap();
        b.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let (winner, winner_inner, loser, loser_inner) = if a.state() == ListenerState::Running {
            (&a, &inner_a, &b, &inner_b)
        } else {
            (&b, &inner_b, &a, &inner_a)
        };
        assert_eq!(winner.state(), ListenerState::Running);
        assert_eq!(loser.state(), ListenerState::Starting);
        assert_eq!(loser_inner.starts.load(Ordering::SeqCst), 0);

        winner.stop().await.unwrap();
        assert_eq!(winner.state(), ListenerState::Stopped);
        assert!(!winner_inner.running.load(Ordering::SeqCst));

        wait_for(loser, ListenerState::Running).await;
        assert!(loser_inner.running.load(Ordering::SeqCst));
        loser.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lock_loss_stops_inner_listener() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let inner = Arc::new(Recording::default());
        let listener = singleton(store.clone(), Arc::clone(&inner));

        listener.start().await.unwrap();
        wait_for(&listener, ListenerState::Running).await;

        store.set_available(false);
        wait_for(&listener, ListenerState::Faulted).await;

        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);
        assert!(!inner.running.load(Ordering::SeqCst));
        assert!(listener.handle().fault().is_some());

        // stop after a fault is a no-op for the inner listener
        listener.stop().await.unwrap();
        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);
        assert_eq!(listener.state(), ListenerState::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_waiting_does_not_hang() {
        let store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let holder = singleton(Arc::clone(&store), Arc::new(Recording::default()));
        let inner = Arc::new(Recording::default());
        let waiter = singleton(Arc::clone(&store), Arc::clone(&inner));

        holder.start().await.unwrap();
        wait_for(&holder, ListenerState::Running).await;
        waiter.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        tokio::time::timeout(Duration::from_millis(50), waiter.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(waiter.state(), ListenerState::Stopped);
        assert_eq!(inner.starts.load(Ordering::SeqCst), 0);

        // idempotent
        waiter.stop().await.unwrap();
        holder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_never_starts() {
        let store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let inner = Arc::new(Recording::default());
        let listener = singleton(store, Arc::clone(&inner));

        listener.stop().await.unwrap();
        listener.start().await.unwrap();

        assert_eq!(listener.state(), ListenerState::Stopped);
        assert_eq!(inner.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_start_keeps_the_lock_renewed() {
        // leases expire as tokio time advances
        let store: Arc<dyn LeaseStore> =
            Arc::new(InMemoryLeaseStore::with_clock(Arc::new(TokioClock::new())));
        let period = Duration::from_secs(60);
        let slow = Recording::slow(Duration::from_secs(55));
        let fast = Arc::new(Recording::default());
        let a = singleton_with_period(Arc::clone(&store), Arc::clone(&slow), period);
        let b = singleton_with_period(Arc::clone(&store), Arc::clone(&fast), period);

        a.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        b.start().await.unwrap();

        // past the first lease period: a finished starting, b must still wait
        tokio::time::sleep(Duration::from_secs(64)).await;
        assert_eq!(a.state(), ListenerState::Running);
        assert!(slow.running.load(Ordering::SeqCst));
        assert_eq!(b.state(), ListenerState::Starting);
        assert_eq!(fast.starts.load(Ordering::SeqCst), 0);

        a.stop().await.unwrap();
        wait_for(&b, ListenerState::Running).await;
        assert!(!slow.running.load(Ordering::SeqCst));
        b.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_renewal_faults_within_the_lease_period() {
        let store = Arc::new(StallingStore::new());
        let inner = Arc::new(Recording::default());
        let listener = singleton(store.clone(), Arc::clone(&inner));

        listener.start().await.unwrap();
        wait_for(&listener, ListenerState::Running).await;
        store.stall_renewals();

        tokio::time::timeout(
            Duration::from_secs(30),
            wait_for(&listener, ListenerState::Faulted),
        )
        .await
        .unwrap();
        assert!(!inner.running.load(Ordering::SeqCst));
        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(5), listener.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listener.state(), ListenerState::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_stalled_renewal_returns_promptly() {
        let store = Arc::new(StallingStore::new());
        let inner = Arc::new(Recording::default());
        let listener = singleton(store.clone(), Arc::clone(&inner));

        listener.start().await.unwrap();
        wait_for(&listener, ListenerState::Running).await;
        store.stall_renewals();
        // the first renewal (t=10s) is stuck in the store
        tokio::time::sleep(Duration::from_secs(12)).await;

        tokio::time::timeout(Duration::from_secs(1), listener.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(!inner.running.load(Ordering::SeqCst));
        assert!(store.current("fleet/Acme.Sweep.Listener").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_lost_during_start_aborts_the_start() {
        let store = Arc::new(StallingStore::new());
        let inner = Recording::slow(Duration::from_secs(3600));
        let listener = singleton(store.clone(), Arc::clone(&inner));

        listener.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(inner.starts.load(Ordering::SeqCst), 1);
        store.stall_renewals();

        tokio::time::timeout(
            Duration::from_secs(30),
            wait_for(&listener, ListenerState::Faulted),
        )
        .await
        .unwrap();
        assert!(!inner.running.load(Ordering::SeqCst));
        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);
        assert!(listener.handle().fault().is_some());
    }
}
