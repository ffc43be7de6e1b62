//! HostListenerFactory - 関数ごとの listener を組み立てて CompositeListener にする
//!
//! # 関数ごとの流れ
//! 1. Skip: 無効化されていれば info ログを出して除外
//! 2. Build: 関数自身の ListenerFactory で listener を作る
//! 3. Decorate (singleton): 必要なら SingletonListener で包む
//! 4. Decorate (fault isolation): 常に FaultIsolatingListener で包む
//! 5. 集約に追加
//!
//! 全関数の処理が終わったら（途中で中断した場合も）`listeners created`
//! コールバックをちょうど 1 回呼ぶ。

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{error, info};

use super::composite::CompositeListener;
use super::disable::{DisableProvider, DisableRegistry};
use super::fault::FaultIsolatingListener;
use super::handle::ListenerHandle;
use crate::config::HostConfig;
use crate::domain::{FunctionDescriptor, FunctionId, HostError, ListenerError};
use crate::ports::{LeaseStore, Listener, Settings};
use crate::singleton::{SingletonListener, SingletonManager};

/// Per-function construction result, handed to the `listeners created` callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationSummary {
    pub created: Vec<FunctionId>,
    pub skipped: Vec<FunctionId>,
    pub faulted: Vec<FunctionId>,
}

/// One-shot readiness callback.
pub type ListenersCreated = Box<dyn FnOnce(&CreationSummary) + Send + Sync>;

/// Builder; everything that can be misconfigured fails in `build()`.
pub struct HostListenerFactoryBuilder {
    config: HostConfig,
    settings: Option<Arc<dyn Settings>>,
    lease_store: Option<Arc<dyn LeaseStore>>,
    functions: Vec<FunctionDescriptor>,
    providers: Vec<(String, Arc<dyn DisableProvider>)>,
    on_created: Option<ListenersCreated>,
}

impl HostListenerFactoryBuilder {
    pub fn settings(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn lease_store(mut self, store: Arc<dyn LeaseStore>) -> Self {
        self.lease_store = Some(store);
        self
    }

    pub fn function(mut self, descriptor: FunctionDescriptor) -> Self {
        self.functions.push(descriptor);
        self
    }

    pub fn functions(mut self, descriptors: impl IntoIterator<Item = FunctionDescriptor>) -> Self {
        self.functions.extend(descriptors);
        self
    }

    pub fn disable_provider(mut self, name: impl Into<String>, provider: Arc<dyn DisableProvider>) -> Self {
        self.providers.push((name.into(), provider));
        self
    }

    pub fn on_listeners_created<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&CreationSummary) + Send + Sync + 'static,
    {
        self.on_created = Some(Box::new(callback));
        self
    }

    /// Validate the configuration and resolve every disable marker.
    pub fn build(self) -> Result<HostListenerFactory, HostError> {
        self.config.validate()?;

        let settings = self
            .settings
            .ok_or_else(|| config_error("settings are required"))?;
        let lease_store = self
            .lease_store
            .ok_or_else(|| config_error("a lease store is required"))?;

        let mut seen = std::collections::HashSet::new();
        for descriptor in &self.functions {
            if !seen.insert(descriptor.id.clone()) {
                return Err(config_error(&format!(
                    "function '{}' is registered twice",
                    descriptor.id
                )));
            }
        }

        let mut disable = DisableRegistry::new(self.config.settings_prefix.clone(), settings);
        for (name, provider) in self.providers {
            disable.add_provider(name, provider);
        }
        for descriptor in &self.functions {
            disable.register(descriptor)?;
        }

        let singleton = Arc::new(SingletonManager::new(
            lease_store,
            self.config.singleton.clone(),
            self.config.host_id.clone(),
        ));

        Ok(HostListenerFactory {
            allow_partial: self.config.allow_partial_host_startup,
            functions: self.functions,
            disable,
            singleton,
            on_created: self.on_created,
        })
    }
}

fn config_error(message: &str) -> HostError {
    HostError::Config(crate::config::ConfigError::Invalid(message.to_string()))
}

pub struct HostListenerFactory {
    allow_partial: bool,
    functions: Vec<FunctionDescriptor>,
    disable: DisableRegistry,
    singleton: Arc<SingletonManager>,
    on_created: Option<ListenersCreated>,
}

impl HostListenerFactory {
    pub fn builder(config: HostConfig) -> HostListenerFactoryBuilder {
        HostListenerFactoryBuilder {
            config,
            settings: None,
            lease_store: None,
            functions: Vec::new(),
            providers: Vec::new(),
            on_created: None,
        }
    }

    /// Shared manager, also used for function-mode exclusive runs.
    pub fn singleton_manager(&self) -> Arc<SingletonManager> {
        Arc::clone(&self.singleton)
    }

    /// Build the composite listener. Consumes the factory, so the callback
    /// can only ever fire once.
    pub async fn create(mut self) -> Result<CompositeListener, HostError> {
        let mut summary = CreationSummary::default();
        let mut listeners = Vec::new();
        let mut handles = Vec::new();

        let result = self
            .create_all(&mut summary, &mut listeners, &mut handles)
            .await;

        info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            faulted = summary.faulted.len(),
            "listeners created"
        );
        if let Some(callback) = self.on_created.take() {
            callback(&summary);
        }

        result.map(|()| CompositeListener::new(listeners, handles, self.allow_partial))
    }

    async fn create_all(
        &self,
        summary: &mut CreationSummary,
        listeners: &mut Vec<Arc<FaultIsolatingListener>>,
        handles: &mut Vec<ListenerHandle>,
    ) -> Result<(), HostError> {
        for descriptor in &self.functions {
            let function = descriptor.id.clone();

            if self.disable.is_disabled(descriptor) {
                info!(function = %function, "function is disabled; no listener created");
                summary.skipped.push(function);
                continue;
            }

            let handle = ListenerHandle::new(function.clone());
            handles.push(handle.clone());

            let inner = match build(descriptor).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(function = %function, error = %err, "failed to build listener");
                    handle.fault_with(err.clone());
                    summary.faulted.push(function.clone());
                    if self.allow_partial {
                        continue;
                    }
                    return Err(HostError::ListenerFaulted {
                        function,
                        source: err,
                    });
                }
            };

            let wrapped = match self.singleton.requires_singleton(descriptor, inner.as_ref()) {
                Some(spec) => {
                    let key = self.singleton.listener_lock_key(&function, &spec);
                    info!(function = %function, key = %key, "listener runs as a singleton");
                    let decorated: Arc<dyn Listener> = Arc::new(SingletonListener::new(
                        inner,
                        Arc::clone(&self.singleton),
                        key,
                        handle.clone(),
                    ));
                    FaultIsolatingListener::deferred(decorated, handle, self.allow_partial)
                }
                None => FaultIsolatingListener::new(inner, handle, self.allow_partial),
            };

            listeners.push(Arc::new(wrapped));
            summary.created.push(function);
        }
        Ok(())
    }
}

/// Run the function's own factory on a separate task so a panic is a fault.
async fn build(descriptor: &FunctionDescriptor) -> Result<Arc<dyn Listener>, ListenerError> {
    let factory = Arc::clone(&descriptor.listener_factory);
    match tokio::spawn(async move { factory.create().await }).await {
        Ok(result) => result,
        Err(join) => Err(build_panic(join)),
    }
}

fn build_panic(join: JoinError) -> ListenerError {
    if join.is_panic() {
        ListenerError::Panicked(format!("listener factory panicked: {join}"))
    } else {
        ListenerError::Create(format!("listener factory task aborted: {join}"))
    }
}
