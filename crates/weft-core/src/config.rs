//! Host configuration.
//!
//! # 設計原則
//! - 既定値は `Default` に集約する
//! - 起動時に `validate()` で検証する（Fail-fast）
//! - 設定値の取得元は `Settings` port（環境変数、テスト用 map など）

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::ports::Settings;
use crate::ports::settings::lookup;

/// Configuration errors. Always fatal, always reported at startup/registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for setting '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("function '{function}' references unknown disable provider '{provider}'")]
    UnknownDisableProvider { function: String, provider: String },
}

/// Singleton lease timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingletonConfig {
    /// Lease period for function-mode locks.
    #[serde(with = "millis")]
    pub lock_period: Duration,

    /// Lease period for listener-mode locks.
    #[serde(with = "millis")]
    pub listener_lock_period: Duration,

    /// Renewal cadence. When unset, a third of the lease period is used.
    #[serde(with = "millis_opt")]
    pub renewal_interval: Option<Duration>,

    /// Backoff between acquisition attempts while another holder owns the lease.
    pub acquire_backoff: BackoffPolicy,

    /// Give up waiting after this long. `None` waits until cancelled.
    #[serde(with = "millis_opt")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for SingletonConfig {
    fn default() -> Self {
        Self {
            lock_period: Duration::from_secs(15),
            listener_lock_period: Duration::from_secs(60),
            renewal_interval: None,
            acquire_backoff: BackoffPolicy::lease_acquisition(),
            acquire_timeout: None,
        }
    }
}

impl SingletonConfig {
    /// Renewal cadence for a lease of `period`. Always strictly shorter than
    /// `period` once the config has been validated.
    pub fn renewal_interval_for(&self, period: Duration) -> Duration {
        self.renewal_interval.unwrap_or(period / 3)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [
            ("lock_period", self.lock_period),
            ("listener_lock_period", self.listener_lock_period),
        ] {
            if period.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
            let renewal = self.renewal_interval_for(period);
            if renewal.is_zero() || renewal >= period {
                return Err(ConfigError::Invalid(format!(
                    "renewal interval {renewal:?} must be positive and shorter than {name} {period:?}"
                )));
            }
        }
        self.acquire_backoff.validate("acquire_backoff")
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Fleet-wide host identity; prefixes every lease key.
    pub host_id: String,

    /// When true, a faulted listener is isolated and the rest of the host
    /// keeps starting. When false, the fault aborts host startup.
    pub allow_partial_host_startup: bool,

    /// Prefix of per-function settings (`<prefix>.<Function>.Disabled`).
    pub settings_prefix: String,

    pub singleton: SingletonConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_id: "weft-host".to_string(),
            allow_partial_host_startup: false,
            settings_prefix: "Weft".to_string(),
            singleton: SingletonConfig::default(),
        }
    }
}

impl HostConfig {
    /// Overlay values found in `settings` on top of the defaults.
    ///
    /// Keys (dot form; the underscore spelling is accepted as well):
    /// - `<prefix>.Host.Id`
    /// - `<prefix>.Host.AllowPartialHostStartup`
    /// - `<prefix>.Singleton.LockPeriodMs`
    /// - `<prefix>.Singleton.ListenerLockPeriodMs`
    /// - `<prefix>.Singleton.RenewalIntervalMs`
    /// - `<prefix>.Singleton.AcquireTimeoutMs`
    pub fn from_settings(prefix: &str, settings: &dyn Settings) -> Result<Self, ConfigError> {
        let mut config = HostConfig {
            settings_prefix: prefix.to_string(),
            ..HostConfig::default()
        };

        if let Some(id) = lookup(settings, &format!("{prefix}.Host.Id")) {
            config.host_id = id;
        }
        if let Some(flag) = read_bool(settings, &format!("{prefix}.Host.AllowPartialHostStartup"))? {
            config.allow_partial_host_startup = flag;
        }
        if let Some(ms) = read_millis(settings, &format!("{prefix}.Singleton.LockPeriodMs"))? {
            config.singleton.lock_period = ms;
        }
        if let Some(ms) = read_millis(settings, &format!("{prefix}.Singleton.ListenerLockPeriodMs"))? {
            config.singleton.listener_lock_period = ms;
        }
        if let Some(ms) = read_millis(settings, &format!("{prefix}.Singleton.RenewalIntervalMs"))? {
            config.singleton.renewal_interval = Some(ms);
        }
        if let Some(ms) = read_millis(settings, &format!("{prefix}.Singleton.AcquireTimeoutMs"))? {
            config.singleton.acquire_timeout = Some(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_id.trim().is_empty() {
            return Err(ConfigError::Invalid("host_id must not be empty".to_string()));
        }
        if self.host_id.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "host_id '{}' must not contain '/'",
                self.host_id
            )));
        }
        self.singleton.validate()
    }
}

fn read_bool(settings: &dyn Settings, key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = lookup(settings, key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: "expected true/false".to_string(),
        }),
    }
}

fn read_millis(settings: &dyn Settings, key: &str) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = lookup(settings, key) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: e.to_string(),
        })
}

/// Serde helper: `Duration` as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Serde helper: `Option<Duration>` as optional integer milliseconds.
pub(crate) mod millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
