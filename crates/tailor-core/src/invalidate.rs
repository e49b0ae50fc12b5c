//! CDN cache invalidation after an index update.

use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use time::macros::format_description;
use time::OffsetDateTime;

/// Asks a CDN to drop its cached copy of one object.
pub trait CacheInvalidator: Send + Sync {
    /// # Errors
    /// Returns the provider error; callers treat it as non-fatal.
    fn invalidate(&self, distribution_id: &str, path: &str, caller_reference: &str) -> Result<()>;
}

#[must_use]
pub fn invalidation_path(key: &str) -> String {
    format!("/{key}")
}

/// `YYYYMMDDHHMMSS` of `now`, unique enough per publish.
///
/// # Errors
/// Fails only if `now` cannot be formatted.
pub fn caller_reference(now: OffsetDateTime) -> Result<String> {
    Ok(now.format(format_description!(
        "[year][month][day][hour][minute][second]"
    ))?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub path: String,
    pub caller_reference: String,
}

/// Keeps requests in memory; used where no CDN is reachable.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    requests: Mutex<Vec<InvalidationRequest>>,
    failing: bool,
}

impl RecordingInvalidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An invalidator that rejects every request after recording it.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            requests: Mutex::default(),
            failing: true,
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<InvalidationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, distribution_id: &str, path: &str, caller_reference: &str) -> Result<()> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InvalidationRequest {
                distribution_id: distribution_id.to_string(),
                path: path.to_string(),
                caller_reference: caller_reference.to_string(),
            });
        if self.failing {
            bail!("invalidation rejected for {distribution_id}");
        }
        Ok(())
    }
}

#[cfg(feature = "s3")]
pub use cloudfront::CloudFrontInvalidator;

#[cfg(feature = "s3")]
mod cloudfront {
    use std::fmt;

    use anyhow::{anyhow, Context, Result};
    use aws_sdk_cloudfront::error::DisplayErrorContext;
    use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
    use aws_sdk_cloudfront::Client;
    use tokio::runtime::Runtime;
    use tracing::debug;

    use super::CacheInvalidator;
    use crate::store::{blocking_runtime, load_sdk_config};

    pub struct CloudFrontInvalidator {
        client: Client,
        runtime: Runtime,
    }

    impl fmt::Debug for CloudFrontInvalidator {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("CloudFrontInvalidator").finish_non_exhaustive()
        }
    }

    impl CloudFrontInvalidator {
        /// # Errors
        /// Fails if the async runtime cannot start.
        pub fn connect() -> Result<Self> {
            let runtime = blocking_runtime()?;
            let sdk_config = load_sdk_config(&runtime);
            Ok(Self {
                client: Client::new(&sdk_config),
                runtime,
            })
        }
    }

    impl CacheInvalidator for CloudFrontInvalidator {
        fn invalidate(
            &self,
            distribution_id: &str,
            path: &str,
            caller_reference: &str,
        ) -> Result<()> {
            let paths = Paths::builder()
                .quantity(1)
                .items(path)
                .build()
                .context("invalid invalidation paths")?;
            let batch = InvalidationBatch::builder()
                .paths(paths)
                .caller_reference(caller_reference)
                .build()
                .context("invalid invalidation batch")?;
            let output = self
                .runtime
                .block_on(
                    self.client
                        .create_invalidation()
                        .distribution_id(distribution_id)
                        .invalidation_batch(batch)
                        .send(),
                )
                .map_err(|err| anyhow!("{}", DisplayErrorContext(&err)))?;
            debug!(
                distribution_id,
                path,
                invalidation = output.invalidation().map(|inv| inv.id()),
                "invalidation requested"
            );
            Ok(())
        }
    }
}
