//! SingletonManager - lease の取得・更新・解放
//!
//! # 方針
//! - 取得できない（他者が保持中）はエラーではない → backoff して再試行
//! - 更新に失敗したら保持者は即座に停止する（可用性より排他性を優先）
//! - 待機はすべて cancel 信号と select する

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SingletonConfig;
use crate::domain::{
    FunctionDescriptor, FunctionId, HolderId, Lease, SingletonMode, SingletonSpec,
};
use crate::ports::{LeaseStore, LeaseStoreError, Listener};
use crate::shutdown::cancelled;

/// Result of a (possibly long) acquisition wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(Lease),
    Cancelled,
    TimedOut,
}

/// Result of a single renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed(Lease),
    /// Someone else owns the key now, or our lease expired.
    Lost,
    /// The store could not be reached; ownership is unknown.
    Unavailable(LeaseStoreError),
}

/// Why a held lease can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseLoss {
    #[error("lease was taken over or expired")]
    Stolen,

    #[error("lease store unreachable past the renewal grace period: {0}")]
    Unreachable(LeaseStoreError),
}

/// How a `hold` loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Cancelled while still owning the lease; the caller should release it.
    Cancelled(Lease),
    Lost(LeaseLoss),
}

/// How a function-mode exclusive run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusiveOutcome<T> {
    Completed(T),
    Cancelled,
    TimedOut,
    /// The lease was lost mid-run; the work was aborted.
    Lost(LeaseLoss),
}

/// Fleet-wide mutual exclusion keyed by function identity.
pub struct SingletonManager {
    store: Arc<dyn LeaseStore>,
    config: SingletonConfig,
    host_id: String,
}

impl SingletonManager {
    pub fn new(store: Arc<dyn LeaseStore>, config: SingletonConfig, host_id: impl Into<String>) -> Self {
        Self {
            store,
            config,
            host_id: host_id.into(),
        }
    }

    pub fn config(&self) -> &SingletonConfig {
        &self.config
    }

    /// `{host_id}/{function}[.{scope}]`
    pub fn lock_key(&self, function: &FunctionId, spec: &SingletonSpec) -> String {
        match spec.scope.as_deref() {
            Some(scope) if !scope.is_empty() => format!("{}/{}.{}", self.host_id, function, scope),
            _ => format!("{}/{}", self.host_id, function),
        }
    }

    /// Key of the lock held for as long as a singleton listener runs.
    pub fn listener_lock_key(&self, function: &FunctionId, spec: &SingletonSpec) -> String {
        format!("{}.Listener", self.lock_key(function, spec))
    }

    /// Whether the listener built for `descriptor` must run as a singleton.
    ///
    /// A listener-mode marker on the function wins; otherwise the listener
    /// type's own requirement applies. Function-mode markers guard
    /// invocations, not the listener.
    pub fn requires_singleton(
        &self,
        descriptor: &FunctionDescriptor,
        listener: &dyn Listener,
    ) -> Option<SingletonSpec> {
        match &descriptor.singleton {
            Some(spec) if spec.mode == SingletonMode::Listener => Some(spec.clone()),
            _ => listener.singleton(),
        }
    }

    /// Single acquisition attempt.
    pub async fn try_acquire(
        &self,
        key: &str,
        holder: &HolderId,
        period: Duration,
    ) -> Result<Option<Lease>, LeaseStoreError> {
        self.store.try_acquire(key, holder, period).await
    }

    /// Wait until the lease for `key` is ours, backing off between attempts.
    ///
    /// Store errors are retried like contention: nothing is held yet.
    pub async fn acquire(
        &self,
        key: &str,
        period: Duration,
        cancel: &mut watch::Receiver<bool>,
    ) -> AcquireOutcome {
        let holder = HolderId::generate();
        let backoff = &self.config.acquire_backoff;
        let deadline = self.config.acquire_timeout.map(|t| Instant::now() + t);
        let mut delay = backoff.first_delay();
        let mut attempts: u32 = 0;

        loop {
            if *cancel.borrow() {
                return AcquireOutcome::Cancelled;
            }

            attempts += 1;
            match self.try_acquire(key, &holder, period).await {
                Ok(Some(lease)) => {
                    if *cancel.borrow() {
                        self.release(&lease).await;
                        return AcquireOutcome::Cancelled;
                    }
                    info!(key = %key, holder = %holder, attempts, "singleton lease acquired");
                    return AcquireOutcome::Acquired(lease);
                }
                Ok(None) => {
                    debug!(key = %key, retry_in = ?delay, "singleton lease held elsewhere");
                }
                Err(err) => {
                    warn!(key = %key, error = %err, retry_in = ?delay, "lease store error during acquisition");
                }
            }

            let mut wait = delay;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    warn!(key = %key, attempts, "gave up waiting for singleton lease");
                    return AcquireOutcome::TimedOut;
                }
                wait = wait.min(deadline - now);
            }

            tokio::select! {
                _ = cancelled(cancel) => return AcquireOutcome::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
            delay = backoff.next_delay(delay);
        }
    }

    pub async fn renew(&self, lease: &Lease, period: Duration) -> RenewOutcome {
        match self.store.renew(lease, period).await {
            Ok(Some(renewed)) => RenewOutcome::Renewed(renewed),
            Ok(None) => RenewOutcome::Lost,
            Err(err) => RenewOutcome::Unavailable(err),
        }
    }

    /// Keep `lease` alive until cancelled or lost.
    ///
    /// Renews every `renewal_interval`. An unreachable store is tolerated
    /// while the time since the last successful renewal stays below
    /// `period - renewal_interval`; past that the lease may expire before we
    /// notice, so it counts as lost. A renew call that does not answer within
    /// the remaining grace counts as unreachable.
    pub async fn hold(
        &self,
        lease: Lease,
        period: Duration,
        cancel: &mut watch::Receiver<bool>,
    ) -> HoldOutcome {
        let interval = self.config.renewal_interval_for(period);
        let grace = period.saturating_sub(interval);
        let mut lease = lease;
        // start of the last successful renewal call; the store's expiry is
        // never earlier than this plus `period`
        let mut last_renewed = Instant::now();

        loop {
            tokio::select! {
                _ = cancelled(cancel) => return HoldOutcome::Cancelled(lease),
                _ = tokio::time::sleep(interval) => {}
            }

            let attempt = Instant::now();
            let budget = renewal_budget(last_renewed, grace, period, attempt);
            let renewed = tokio::select! {
                _ = cancelled(cancel) => return HoldOutcome::Cancelled(lease),
                renewed = tokio::time::timeout(budget, self.renew(&lease, period)) => renewed,
            };
            let renewed = renewed.unwrap_or_else(|_| {
                RenewOutcome::Unavailable(LeaseStoreError::Unavailable(format!(
                    "renewal did not answer within {budget:?}"
                )))
            });

            match renewed {
                RenewOutcome::Renewed(next) => {
                    debug!(key = %next.key, expires_at = %next.expires_at, "singleton lease renewed");
                    lease = next;
                    last_renewed = attempt;
                }
                RenewOutcome::Lost => {
                    error!(key = %lease.key, "singleton lease lost");
                    return HoldOutcome::Lost(LeaseLoss::Stolen);
                }
                RenewOutcome::Unavailable(err) => {
                    let since = last_renewed.elapsed();
                    if since >= grace {
                        error!(key = %lease.key, error = %err, since = ?since, "singleton lease renewal grace exceeded");
                        return HoldOutcome::Lost(LeaseLoss::Unreachable(err));
                    }
                    warn!(key = %lease.key, error = %err, since = ?since, "singleton lease renewal failed, retrying");
                }
            }
        }
    }

    /// Proactive release; a failure only delays the next holder until expiry.
    pub async fn release(&self, lease: &Lease) {
        match self.store.release(lease).await {
            Ok(()) => info!(key = %lease.key, "singleton lease released"),
            Err(err) => warn!(key = %lease.key, error = %err, "failed to release singleton lease"),
        }
    }

    /// Run `work` while holding the function lock for `key`.
    ///
    /// The work is dropped (aborted) as soon as the lease is lost or `cancel`
    /// fires.
    pub async fn run_exclusive<F, T>(
        &self,
        key: &str,
        work: F,
        cancel: &mut watch::Receiver<bool>,
    ) -> ExclusiveOutcome<T>
    where
        F: Future<Output = T>,
    {
        let period = self.config.lock_period;
        let lease = match self.acquire(key, period, cancel).await {
            AcquireOutcome::Acquired(lease) => lease,
            AcquireOutcome::Cancelled => return ExclusiveOutcome::Cancelled,
            AcquireOutcome::TimedOut => return ExclusiveOutcome::TimedOut,
        };

        // renewal runs on its own signal; the caller's cancel aborts the work
        let (_renewal_tx, mut renewal_rx) = watch::channel(false);
        let hold = self.hold(lease.clone(), period, &mut renewal_rx);
        tokio::pin!(hold);
        tokio::pin!(work);

        let outcome = tokio::select! {
            value = &mut work => ExclusiveOutcome::Completed(value),
            held = &mut hold => match held {
                HoldOutcome::Lost(loss) => {
                    error!(key = %key, reason = %loss, "exclusive run aborted");
                    return ExclusiveOutcome::Lost(loss);
                }
                HoldOutcome::Cancelled(_) => ExclusiveOutcome::Cancelled,
            },
            _ = cancelled(cancel) => ExclusiveOutcome::Cancelled,
        };

        self.release(&lease).await;
        outcome
    }
}

/// Time a single renew call may take: what is left of the grace window, or,
/// once that is used up, what is left of the lease itself.
fn renewal_budget(last_renewed: Instant, grace: Duration, period: Duration, now: Instant) -> Duration {
    let grace_left = (last_renewed + grace).saturating_duration_since(now);
    if grace_left.is_zero() {
        (last_renewed + period).saturating_duration_since(now)
    } else {
        grace_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::domain::ListenerError;
    use crate::impls::InMemoryLeaseStore;
    use crate::ports::{FixedClock, ListenerFactory};
    use crate::shutdown;
    use crate::singleton::testing::StallingStore;
    use async_trait::async_trait;
    use chrono::Utc;

    fn config() -> SingletonConfig {
        SingletonConfig {
            lock_period: Duration::from_secs(15),
            listener_lock_period: Duration::from_secs(60),
            renewal_interval: None,
            acquire_backoff: BackoffPolicy::new(
                Duration::from_millis(100),
                2.0,
                Duration::from_secs(1),
            ),
            acquire_timeout: None,
        }
    }

    fn manager(store: Arc<dyn LeaseStore>) -> SingletonManager {
        SingletonManager::new(store, config(), "host-a")
    }

    struct Noop;

    #[async_trait]
    impl Listener for Noop {
        async fn start(&self) -> Result<(), ListenerError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            Ok(())
        }
    }

    struct SelfSingleton;

    #[async_trait]
    impl Listener for SelfSingleton {
        async fn start(&self) -> Result<(), ListenerError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ListenerError> {
            Ok(())
        }
        fn singleton(&self) -> Option<SingletonSpec> {
            Some(SingletonSpec::listener())
        }
    }

    struct NoopFactory;

    #[async_trait]
    impl ListenerFactory for NoopFactory {
        async fn create(&self) -> Result<Arc<dyn Listener>, ListenerError> {
            Ok(Arc::new(Noop))
        }
    }

    #[test]
    fn lock_keys() {
        let m = manager(Arc::new(InMemoryLeaseStore::new()));
        let f = FunctionId::new("Acme.Process");
        assert_eq!(m.lock_key(&f, &SingletonSpec::function()), "host-a/Acme.Process");
        assert_eq!(
            m.lock_key(&f, &SingletonSpec::function().with_scope("tenant1")),
            "host-a/Acme.Process.tenant1"
        );
        assert_eq!(
            m.listener_lock_key(&f, &SingletonSpec::listener()),
            "host-a/Acme.Process.Listener"
        );
    }

    #[test]
    fn singleton_requirement_comes_from_descriptor_or_listener() {
        let m = manager(Arc::new(InMemoryLeaseStore::new()));
        let plain = FunctionDescriptor::new("F", "F", Arc::new(NoopFactory));
        assert_eq!(m.requires_singleton(&plain, &Noop), None);
        assert_eq!(
            m.requires_singleton(&plain, &SelfSingleton),
            Some(SingletonSpec::listener())
        );

        let marked = plain.clone().with_singleton(SingletonSpec::listener().with_scope("s"));
        assert_eq!(
            m.requires_singleton(&marked, &Noop),
            Some(SingletonSpec::listener().with_scope("s"))
        );

        let function_mode = plain.with_singleton(SingletonSpec::function());
        assert_eq!(m.requires_singleton(&function_mode, &Noop), None);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_release() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let a = Arc::new(manager(store.clone()));
        let b = Arc::new(manager(store.clone()));
        let (_tx, mut rx) = shutdown::channel();

        let AcquireOutcome::Acquired(lease) = a.acquire("k", Duration::from_secs(60), &mut rx).await
        else {
            panic!("first acquire must succeed");
        };

        let waiter = {
            let b = Arc::clone(&b);
            let mut rx = rx.clone();
            tokio::spawn(async move { b.acquire("k", Duration::from_secs(60), &mut rx).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        a.release(&lease).await;
        let outcome = waiter.await.unwrap();
        let AcquireOutcome::Acquired(second) = outcome else {
            panic!("expected acquisition after release, got {outcome:?}");
        };
        assert_ne!(second.holder, lease.holder);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_is_cancelled_promptly() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let a = manager(store.clone());
        let b = Arc::new(manager(store));
        let (tx, mut rx) = shutdown::channel();

        assert!(matches!(
            a.acquire("k", Duration::from_secs(60), &mut rx).await,
            AcquireOutcome::Acquired(_)
        ));

        let waiter = {
            let mut rx = rx.clone();
            tokio::spawn(async move { b.acquire("k", Duration::from_secs(60), &mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(250)).await;
        tx.send_replace(true);

        let outcome = tokio::time::timeout(Duration::from_millis(10), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let holder = manager(store.clone());
        let mut cfg = config();
        cfg.acquire_timeout = Some(Duration::from_secs(2));
        let waiter = SingletonManager::new(store, cfg, "host-a");
        let (_tx, mut rx) = shutdown::channel();

        holder.acquire("k", Duration::from_secs(60), &mut rx).await;
        assert_eq!(
            waiter.acquire("k", Duration::from_secs(60), &mut rx).await,
            AcquireOutcome::TimedOut
        );
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_retries_through_store_outage() {
        let store = Arc::new(InMemoryLeaseStore::new());
        store.set_available(false);
        let m = Arc::new(manager(store.clone()));
        let (_tx, rx) = shutdown::channel();

        let task = {
            let m = Arc::clone(&m);
            let mut rx = rx.clone();
            tokio::spawn(async move { m.acquire("k", Duration::from_secs(60), &mut rx).await })
        };
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!task.is_finished());

        store.set_available(true);
        assert!(matches!(task.await.unwrap(), AcquireOutcome::Acquired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn hold_reports_stolen_lease() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(InMemoryLeaseStore::with_clock(clock.clone()));
        let m = manager(store.clone());
        let (_tx, mut rx) = shutdown::channel();
        let period = Duration::from_secs(30);

        let AcquireOutcome::Acquired(lease) = m.acquire("k", period, &mut rx).await else {
            panic!("acquire");
        };

        // the lease expires in store time and another holder takes it
        clock.advance(chrono::Duration::seconds(31));
        store
            .try_acquire("k", &HolderId::generate(), period)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            m.hold(lease, period, &mut rx).await,
            HoldOutcome::Lost(LeaseLoss::Stolen)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hold_tolerates_outage_within_grace_only() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let m = Arc::new(manager(store.clone()));
        let (_tx, mut rx) = shutdown::channel();
        // renewal every 10s, grace 20s
        let period = Duration::from_secs(30);

        let AcquireOutcome::Acquired(lease) = m.acquire("k", period, &mut rx).await else {
            panic!("acquire");
        };
        store.set_available(false);

        let started = Instant::now();
        let outcome = m.hold(lease, period, &mut rx).await;
        assert!(matches!(
            outcome,
            HoldOutcome::Lost(LeaseLoss::Unreachable(LeaseStoreError::Unavailable(_)))
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
        assert!(elapsed < period, "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hold_gives_up_on_a_renewal_that_never_answers() {
        let store = Arc::new(StallingStore::new());
        let m = manager(store.clone());
        let (_tx, mut rx) = shutdown::channel();
        // renewal every 10s, grace 20s
        let period = Duration::from_secs(30);

        let AcquireOutcome::Acquired(lease) = m.acquire("k", period, &mut rx).await else {
            panic!("acquire");
        };
        store.stall_renewals();

        let started = Instant::now();
        let outcome = m.hold(lease, period, &mut rx).await;
        assert!(matches!(
            outcome,
            HoldOutcome::Lost(LeaseLoss::Unreachable(LeaseStoreError::Unavailable(_)))
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
        assert!(elapsed < period, "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_stalled_renewal() {
        let store = Arc::new(StallingStore::new());
        let m = Arc::new(manager(store.clone()));
        let (tx, rx) = shutdown::channel();
        let period = Duration::from_secs(30);

        let mut acquire_rx = rx.clone();
        let AcquireOutcome::Acquired(lease) = m.acquire("k", period, &mut acquire_rx).await else {
            panic!("acquire");
        };
        store.stall_renewals();

        let task = {
            let m = Arc::clone(&m);
            let mut rx = rx.clone();
            tokio::spawn(async move { m.hold(lease, period, &mut rx).await })
        };
        // first renewal (t=10s) is now stuck inside the store
        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send_replace(true);

        let outcome = tokio::time::timeout(Duration::from_millis(10), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, HoldOutcome::Cancelled(_)));
    }

    #[test]
    fn renewal_budget_is_grace_then_remaining_lease() {
        let t0 = Instant::now();
        let grace = Duration::from_secs(20);
        let period = Duration::from_secs(30);

        assert_eq!(
            renewal_budget(t0, grace, period, t0 + Duration::from_secs(10)),
            Duration::from_secs(10)
        );
        assert_eq!(
            renewal_budget(t0, grace, period, t0 + Duration::from_secs(25)),
            Duration::from_secs(5)
        );
        assert_eq!(
            renewal_budget(t0, grace, period, t0 + Duration::from_secs(40)),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hold_renews_until_cancelled() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let m = Arc::new(manager(store.clone()));
        let (tx, rx) = shutdown::channel();
        let period = Duration::from_secs(3);

        let mut acquire_rx = rx.clone();
        let AcquireOutcome::Acquired(lease) = m.acquire("k", period, &mut acquire_rx).await else {
            panic!("acquire");
        };
        let first_expiry = lease.expires_at;

        let task = {
            let m = Arc::clone(&m);
            let mut rx = rx.clone();
            tokio::spawn(async move { m.hold(lease, period, &mut rx).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send_replace(true);

        let HoldOutcome::Cancelled(last) = task.await.unwrap() else {
            panic!("expected cancellation");
        };
        assert!(last.expires_at >= first_expiry);
        assert_eq!(store.current("k").await.map(|l| l.holder), Some(last.holder));
    }

    #[tokio::test(start_paused = true)]
    async fn run_exclusive_serializes_work_and_releases() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let m = manager(store.clone());
        let (_tx, mut rx) = shutdown::channel();

        let outcome = m
            .run_exclusive("host-a/F", async { 42 }, &mut rx)
            .await;
        assert_eq!(outcome, ExclusiveOutcome::Completed(42));
        assert!(store.current("host-a/F").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_exclusive_aborts_work_on_loss() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let m = manager(store.clone());
        let (_tx, mut rx) = shutdown::channel();

        let outage = {
            let store = Arc::clone(&store);
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                store.set_available(false);
            }
        };
        tokio::spawn(outage);

        let work = async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            "finished"
        };
        let outcome = m.run_exclusive("host-a/F", work, &mut rx).await;
        assert!(matches!(
            outcome,
            ExclusiveOutcome::Lost(LeaseLoss::Unreachable(_))
        ));
    }
}
