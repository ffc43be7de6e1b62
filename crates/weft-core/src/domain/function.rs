//! Function descriptors: identity, singleton marker, disable marker.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ports::ListenerFactory;

/// Canonical identity of a registered function (e.g. `Acme.Billing.ProcessBlob`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(String);

impl FunctionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// What a singleton lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SingletonMode {
    /// Each invocation of the function body runs under the lock.
    Function,
    /// The function's listener runs under the lock for as long as it is started.
    Listener,
}

/// Singleton marker attached to a function or declared by a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingletonSpec {
    pub mode: SingletonMode,
    /// Optional scope suffix; one lock per distinct scope value.
    pub scope: Option<String>,
}

impl SingletonSpec {
    pub fn listener() -> Self {
        Self {
            mode: SingletonMode::Listener,
            scope: None,
        }
    }

    pub fn function() -> Self {
        Self {
            mode: SingletonMode::Function,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Declarative disable marker, resolved once at registration.
///
/// - `Always`: no setting and no provider given, the function is disabled.
/// - `Setting(name)`: disabled when the named setting is truthy. The name may
///   contain `{MethodName}` / `{MethodShortName}`.
/// - `Provider(name)`: disabled when the registered provider says so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisableMarker {
    Always,
    Setting(String),
    Provider(String),
}

/// Registration-time description of one function. Read-only afterwards.
#[derive(Clone)]
pub struct FunctionDescriptor {
    pub id: FunctionId,
    pub short_name: String,
    pub disabled: bool,
    pub singleton: Option<SingletonSpec>,
    pub disable_marker: Option<DisableMarker>,
    pub listener_factory: Arc<dyn ListenerFactory>,
}

impl FunctionDescriptor {
    pub fn new(
        id: impl Into<FunctionId>,
        short_name: impl Into<String>,
        listener_factory: Arc<dyn ListenerFactory>,
    ) -> Self {
        Self {
            id: id.into(),
            short_name: short_name.into(),
            disabled: false,
            singleton: None,
            disable_marker: None,
            listener_factory,
        }
    }

    pub fn with_singleton(mut self, spec: SingletonSpec) -> Self {
        self.singleton = Some(spec);
        self
    }

    pub fn with_disable_marker(mut self, marker: DisableMarker) -> Self {
        self.disable_marker = Some(marker);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

impl From<String> for FunctionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("id", &self.id)
            .field("short_name", &self.short_name)
            .field("disabled", &self.disabled)
            .field("singleton", &self.singleton)
            .field("disable_marker", &self.disable_marker)
            .finish_non_exhaustive()
    }
}
