//! DisableRegistry - 関数の無効化判定
//!
//! 判定順（最初に「無効」となったものが勝つ）:
//! 1. 設定 `<Prefix>.<FunctionName>.Disabled`（`_` 区切りも可）
//! 2. 関数に付けられた `DisableMarker`（登録時に解決済みのチェック）
//!
//! provider 名の解決は登録時に行う。未知の provider は ConfigError。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::domain::{DisableMarker, FunctionDescriptor, FunctionId};
use crate::ports::Settings;
use crate::ports::settings::lookup;

/// Custom disable check, registered by name.
pub trait DisableProvider: Send + Sync {
    fn is_disabled(&self, function: &FunctionId) -> bool;
}

impl<F> DisableProvider for F
where
    F: Fn(&FunctionId) -> bool + Send + Sync,
{
    fn is_disabled(&self, function: &FunctionId) -> bool {
        self(function)
    }
}

/// A marker resolved against the registry.
#[derive(Clone)]
enum DisableCheck {
    Always,
    Setting(String),
    Provider(Arc<dyn DisableProvider>),
}

impl fmt::Debug for DisableCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableCheck::Always => f.write_str("Always"),
            DisableCheck::Setting(name) => f.debug_tuple("Setting").field(name).finish(),
            DisableCheck::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Is `value` one of the accepted "on" spellings (`true`, any case, or `1`)?
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

pub struct DisableRegistry {
    prefix: String,
    settings: Arc<dyn Settings>,
    providers: HashMap<String, Arc<dyn DisableProvider>>,
    checks: HashMap<FunctionId, DisableCheck>,
}

impl DisableRegistry {
    pub fn new(prefix: impl Into<String>, settings: Arc<dyn Settings>) -> Self {
        Self {
            prefix: prefix.into(),
            settings,
            providers: HashMap::new(),
            checks: HashMap::new(),
        }
    }

    pub fn add_provider(&mut self, name: impl Into<String>, provider: Arc<dyn DisableProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Resolve the descriptor's marker into a check.
    pub fn register(&mut self, descriptor: &FunctionDescriptor) -> Result<(), ConfigError> {
        let Some(marker) = &descriptor.disable_marker else {
            return Ok(());
        };
        let check = match marker {
            DisableMarker::Always => DisableCheck::Always,
            DisableMarker::Setting(name) => DisableCheck::Setting(
                name.replace("{MethodName}", descriptor.id.as_str())
                    .replace("{MethodShortName}", &descriptor.short_name),
            ),
            DisableMarker::Provider(name) => {
                let provider = self.providers.get(name).cloned().ok_or_else(|| {
                    ConfigError::UnknownDisableProvider {
                        function: descriptor.id.to_string(),
                        provider: name.clone(),
                    }
                })?;
                DisableCheck::Provider(provider)
            }
        };
        self.checks.insert(descriptor.id.clone(), check);
        Ok(())
    }

    /// Whether the function must be skipped at startup.
    pub fn is_disabled(&self, descriptor: &FunctionDescriptor) -> bool {
        if descriptor.disabled {
            return true;
        }

        let key = format!("{}.{}.Disabled", self.prefix, descriptor.short_name);
        if self.setting_is_truthy(&key) {
            return true;
        }

        match self.checks.get(&descriptor.id) {
            None => false,
            Some(DisableCheck::Always) => true,
            Some(DisableCheck::Setting(name)) => self.setting_is_truthy(name),
            Some(DisableCheck::Provider(provider)) => provider.is_disabled(&descriptor.id),
        }
    }

    /// A `%NAME%` setting name is indirect: the setting `NAME` holds the
    /// actual setting name.
    fn setting_is_truthy(&self, name: &str) -> bool {
        let resolved = match name.strip_prefix('%').and_then(|n| n.strip_suffix('%')) {
            Some(indirect) if !indirect.is_empty() => match lookup(self.settings.as_ref(), indirect) {
                Some(target) => target,
                None => return false,
            },
            _ => name.to_string(),
        };
        lookup(self.settings.as_ref(), &resolved).is_some_and(|v| is_truthy(&v))
    }
}

impl fmt::Debug for DisableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisableRegistry")
            .field("prefix", &self.prefix)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("checks", &self.checks)
            .finish_non_exhaustive()
    }
}
