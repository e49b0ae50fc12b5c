use std::sync::{Arc, OnceLock};

use anyhow::Result;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::invalidate::CacheInvalidator;
use crate::store::{open_store, ObjectStore};

/// Side-effecting collaborators of a command.
pub trait Effects: Send + Sync {
    fn store(&self) -> Arc<dyn ObjectStore>;
    fn clock(&self) -> Arc<dyn Clock>;
    /// `None` when no CDN client can be used.
    fn invalidator(&self) -> Option<&dyn CacheInvalidator>;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    invalidator: OnceLock<Option<Arc<dyn CacheInvalidator>>>,
}

impl SystemEffects {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        invalidator: Option<Arc<dyn CacheInvalidator>>,
    ) -> Self {
        Self {
            store,
            clock,
            invalidator: OnceLock::from(invalidator),
        }
    }

    /// Opens the configured store with the real clock. The CDN client is
    /// connected on first use.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(&config.store)?;
        debug!(store = %store.describe(), "store opened");
        Ok(Self {
            store,
            clock: Arc::new(SystemClock::new()),
            invalidator: OnceLock::new(),
        })
    }
}

#[cfg(feature = "s3")]
fn cdn_client() -> Result<Arc<dyn CacheInvalidator>> {
    Ok(Arc::new(crate::invalidate::CloudFrontInvalidator::connect()?))
}

#[cfg(not(feature = "s3"))]
fn cdn_client() -> Result<Arc<dyn CacheInvalidator>> {
    anyhow::bail!("this build of tailor does not include CloudFront support")
}

impl Effects for SystemEffects {
    fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn invalidator(&self) -> Option<&dyn CacheInvalidator> {
        self.invalidator
            .get_or_init(|| match cdn_client() {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!(error = %err, "CDN client unavailable");
                    None
                }
            })
            .as_deref()
    }
}
