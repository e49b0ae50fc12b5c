use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::effects::{Effects, SharedEffects, SystemEffects};
use crate::index_store::IndexStore;
use crate::invalidate::CacheInvalidator;
use crate::lock::{LockCoordinator, LockPolicy};
use crate::store::{ObjectStore, StoreLocation};

pub const STORE_ENV: &str = "TAILOR_STORE";
pub const DISTRIBUTION_ENV: &str = "TAILOR_DISTRIBUTION_ID";
pub const TIMEOUT_MIN_ENV: &str = "TAILOR_LOCK_TIMEOUT_MIN_SECS";
pub const TIMEOUT_MAX_ENV: &str = "TAILOR_LOCK_TIMEOUT_MAX_SECS";
pub const JITTER_ENV: &str = "TAILOR_LOCK_JITTER_SECS";
pub const RETRY_ENV: &str = "TAILOR_LOCK_RETRY_SECS";
pub const SEED_ENV: &str = "TAILOR_LOCK_SEED";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub no_color: bool,
    /// `--store`, wins over `TAILOR_STORE`.
    pub store: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }

    fn seconds(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.var(key) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key} must be a whole number of seconds, got '{raw}'")),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub store: StoreLocation,
    /// CloudFront distribution to invalidate after publishing.
    pub distribution_id: Option<String>,
    pub lock: LockPolicy,
}

impl Config {
    /// Builds a configuration from the current process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let defaults = LockPolicy::default();
        let store = match snapshot.var(STORE_ENV) {
            Some(raw) => StoreLocation::parse(raw).with_context(|| format!("invalid {STORE_ENV}"))?,
            None => StoreLocation::default(),
        };
        let seed = snapshot
            .var(SEED_ENV)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{SEED_ENV} must be an unsigned integer, got '{raw}'"))
            })
            .transpose()?;
        let lock = LockPolicy {
            timeout_min: snapshot.seconds(TIMEOUT_MIN_ENV, defaults.timeout_min)?,
            timeout_max: snapshot.seconds(TIMEOUT_MAX_ENV, defaults.timeout_max)?,
            max_jitter: snapshot.seconds(JITTER_ENV, defaults.max_jitter)?,
            retry_delay: snapshot.seconds(RETRY_ENV, defaults.retry_delay)?,
            seed,
        };
        if lock.timeout_min > lock.timeout_max {
            bail!(
                "{TIMEOUT_MIN_ENV} ({}s) exceeds {TIMEOUT_MAX_ENV} ({}s)",
                lock.timeout_min.as_secs(),
                lock.timeout_max.as_secs()
            );
        }
        Ok(Self {
            store,
            distribution_id: snapshot.var(DISTRIBUTION_ENV).map(ToOwned::to_owned),
            lock,
        })
    }

    /// Applies command-line overrides.
    ///
    /// # Errors
    /// Returns an error if `--store` is not a valid location.
    pub fn with_overrides(mut self, global: &GlobalOptions) -> Result<Self> {
        if let Some(raw) = global.store.as_deref() {
            self.store = StoreLocation::parse(raw)?;
        }
        Ok(self)
    }
}

/// Everything a command needs: options, configuration and effects.
pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Reads the environment, applies `global` and connects the configured
    /// store.
    ///
    /// # Errors
    /// Returns an error if configuration is invalid or the store cannot be
    /// opened.
    pub fn new(global: &'a GlobalOptions) -> Result<Self> {
        let config = Config::from_env()?.with_overrides(global)?;
        let effects: SharedEffects = Arc::new(SystemEffects::from_config(&config)?);
        Ok(Self::with_effects(global, config, effects))
    }

    pub fn with_effects(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.effects.store()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.effects.clock()
    }

    pub fn invalidator(&self) -> Option<&dyn CacheInvalidator> {
        self.effects.invalidator()
    }

    pub fn lock_coordinator(&self) -> LockCoordinator {
        LockCoordinator::new(self.store(), self.clock(), self.config.lock.clone())
    }

    pub fn index_store(&self) -> IndexStore {
        IndexStore::new(self.store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[])).expect("config");
        assert_eq!(config.store, StoreLocation::S3 { endpoint: None });
        assert_eq!(config.distribution_id, None);
        assert_eq!(config.lock, LockPolicy::default());
    }

    #[test]
    fn reads_store_and_lock_timing() {
        let snapshot = EnvSnapshot::testing(&[
            (STORE_ENV, "file:///srv/repo"),
            (DISTRIBUTION_ENV, "E2ABC"),
            (TIMEOUT_MIN_ENV, "10"),
            (TIMEOUT_MAX_ENV, "20"),
            (JITTER_ENV, "0"),
            (RETRY_ENV, "1"),
            (SEED_ENV, "42"),
        ]);
        let config = Config::from_snapshot(&snapshot).expect("config");
        assert_eq!(config.store, StoreLocation::Local(PathBuf::from("/srv/repo")));
        assert_eq!(config.distribution_id.as_deref(), Some("E2ABC"));
        assert_eq!(config.lock.timeout_min, Duration::from_secs(10));
        assert_eq!(config.lock.timeout_max, Duration::from_secs(20));
        assert_eq!(config.lock.max_jitter, Duration::ZERO);
        assert_eq!(config.lock.retry_delay, Duration::from_secs(1));
        assert_eq!(config.lock.seed, Some(42));
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_snapshot(&EnvSnapshot::testing(&[(JITTER_ENV, "soon")]))
            .expect_err("not a number");
        assert!(err.to_string().contains(JITTER_ENV));

        let err = Config::from_snapshot(&EnvSnapshot::testing(&[
            (TIMEOUT_MIN_ENV, "60"),
            (TIMEOUT_MAX_ENV, "30"),
        ]))
        .expect_err("inverted window");
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[
            (DISTRIBUTION_ENV, ""),
            (STORE_ENV, "  "),
        ]))
        .expect("config");
        assert_eq!(config.distribution_id, None);
        assert_eq!(config.store, StoreLocation::default());
    }

    #[test]
    fn flag_overrides_environment() {
        let global = GlobalOptions {
            store: Some("memory://".to_string()),
            ..GlobalOptions::default()
        };
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[(STORE_ENV, "file:///x")]))
            .and_then(|config| config.with_overrides(&global))
            .expect("config");
        assert_eq!(config.store, StoreLocation::Memory);
    }

    #[test]
    #[serial]
    fn captures_process_environment() {
        let previous = env::var(DISTRIBUTION_ENV).ok();
        env::set_var(DISTRIBUTION_ENV, "EFROMENV");
        let config = Config::from_env();
        match previous {
            Some(value) => env::set_var(DISTRIBUTION_ENV, value),
            None => env::remove_var(DISTRIBUTION_ENV),
        }
        assert_eq!(config.expect("config").distribution_id.as_deref(), Some("EFROMENV"));
    }
}
