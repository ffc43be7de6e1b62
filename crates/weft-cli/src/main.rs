use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::binding::{BlobPath, Direction, ParameterBindingResolver, StaticBinding, TriggerInputs};
use weft_core::impls::{EnvSettings, InMemoryLeaseStore};
use weft_core::listener::CompositeListener;
use weft_core::singleton::ExclusiveOutcome;
use weft_core::{
    DisableMarker, FunctionDescriptor, HostConfig, HostListenerFactory, LeaseStore, Listener,
    ListenerError, ListenerFactory, SingletonSpec, shutdown,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 一定間隔で「スイープ」するだけの listener（singleton で動かす）
struct SweepListener {
    host: String,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Listener for SweepListener {
    async fn start(&self) -> Result<(), ListenerError> {
        self.running.store(true, Ordering::SeqCst);
        let host = self.host.clone();
        let running = Arc::clone(&self.running);
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                info!(host = %host, "sweeping");
                sleep(Duration::from_millis(500)).await;
            }
        });
        *self.task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

struct SweepFactory {
    host: String,
}

#[async_trait]
impl ListenerFactory for SweepFactory {
    async fn create(&self) -> Result<Arc<dyn Listener>, ListenerError> {
        Ok(Arc::new(SweepListener {
            host: self.host.clone(),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }))
    }
}

/// blob trigger の代わりに、起動時に 1 件だけイベントを流す listener
struct ThumbnailListener {
    trigger: StaticBinding,
    output: ParameterBindingResolver,
}

#[async_trait]
impl Listener for ThumbnailListener {
    async fn start(&self) -> Result<(), ListenerError> {
        let resource = BlobPath::parse("uploads/2024/cat.jpg")
            .map_err(|e| ListenerError::Start(e.to_string()))?;
        let inputs = TriggerInputs::from_trigger(&self.trigger, resource);
        match self.output.resolve(&inputs) {
            Ok(binding) => info!(container = %binding.container(), blob = %binding.blob(), "thumbnail output bound"),
            Err(err) => warn!(error = %err, "thumbnail binding failed"),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        Ok(())
    }
}

struct ThumbnailFactory;

#[async_trait]
impl ListenerFactory for ThumbnailFactory {
    async fn create(&self) -> Result<Arc<dyn Listener>, ListenerError> {
        let trigger = StaticBinding::parse("uploads/{year}/{name}.{ext}", Direction::Input)
            .map_err(|e| ListenerError::Create(e.to_string()))?;
        let output = StaticBinding::parse("thumbnails/{year}/{name}-small.{ext}", Direction::Output)
            .map_err(|e| ListenerError::Create(e.to_string()))?;
        Ok(Arc::new(ThumbnailListener {
            trigger,
            output: ParameterBindingResolver::new(output),
        }))
    }
}

async fn build_host(
    name: &str,
    config: &HostConfig,
    store: Arc<dyn LeaseStore>,
) -> Result<CompositeListener, BoxError> {
    let host = name.to_string();
    let factory = HostListenerFactory::builder(config.clone())
        .settings(Arc::new(EnvSettings))
        .lease_store(store)
        .function(
            FunctionDescriptor::new("Demo.Sweep", "Sweep", Arc::new(SweepFactory { host: host.clone() }))
                .with_singleton(SingletonSpec::listener()),
        )
        .function(FunctionDescriptor::new("Demo.Thumbnail", "Thumbnail", Arc::new(ThumbnailFactory)))
        .function(
            FunctionDescriptor::new("Demo.Legacy", "Legacy", Arc::new(ThumbnailFactory))
                .with_disable_marker(DisableMarker::Always),
        )
        .on_listeners_created(move |summary| {
            info!(
                host = %host,
                created = ?summary.created,
                skipped = ?summary.skipped,
                faulted = ?summary.faulted,
                "host ready"
            );
        })
        .build()?;
    Ok(factory.create().await?)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) 設定（環境変数 Weft.* / Weft_* で上書きできる）
    let mut config = HostConfig::from_settings("Weft", &EnvSettings)?;
    config.singleton.listener_lock_period = Duration::from_secs(3);
    config.singleton.acquire_backoff.initial = Duration::from_millis(250);
    config.singleton.acquire_backoff.max = Duration::from_secs(1);
    config.validate()?;
    info!(config = %serde_json::to_string(&config)?, "configuration loaded");

    // (B) 2 つのホストが同じ lease store を共有する（fleet の模擬）
    let store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
    let host_a = build_host("host-a", &config, Arc::clone(&store)).await?;
    let host_b = build_host("host-b", &config, Arc::clone(&store)).await?;
    host_a.start().await?;
    host_b.start().await?;

    // (C) Sweep はどちらか一方でしか動かない。A を止めると B が引き継ぐ
    sleep(Duration::from_secs(2)).await;
    info!("stopping host-a");
    host_a.stop().await;

    // (D) function-mode の排他実行
    let manager = weft_core::SingletonManager::new(Arc::clone(&store), config.singleton.clone(), config.host_id.clone());
    let key = manager.lock_key(&"Demo.Report".into(), &SingletonSpec::function());
    let (cancel_tx, mut cancel_rx) = shutdown::channel();
    match manager
        .run_exclusive(&key, async { "report written" }, &mut cancel_rx)
        .await
    {
        ExclusiveOutcome::Completed(result) => info!(result, "exclusive run finished"),
        other => warn!(outcome = ?other, "exclusive run did not complete"),
    }

    // (E) Ctrl-C か 3 秒で終了
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = sleep(Duration::from_secs(3)) => {}
    }
    cancel_tx.send_replace(true);
    host_b.stop().await;
    Ok(())
}
