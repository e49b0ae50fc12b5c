//! Records a published artifact in the shared index.
//!
//! Workers publishing concurrently against the same index serialize on the
//! index lock: acquire, load (or start empty), merge, save, release. The merge
//! refuses to overwrite a different value already recorded at the same path.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tailor_domain::{
    merge_documents, nested_record, ArtifactPath, ArtifactRecord, BuildTimestamp,
};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::CommandContext;
use crate::error::PublishError;
use crate::index_store::IndexStore;
use crate::invalidate::{caller_reference, invalidation_path, CacheInvalidator};
use crate::lock::{LockCoordinator, LockOutcome};
use crate::outcome::ExecutionOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReport {
    pub bucket: String,
    pub index_key: String,
    pub timestamp: String,
    pub path: String,
    pub lock: LockOutcome,
    pub waited_secs: f64,
    /// Versions in the index after the update.
    pub versions: usize,
    pub invalidated: bool,
}

struct Cdn<'a> {
    invalidator: &'a dyn CacheInvalidator,
    distribution_id: String,
}

pub struct IndexUpdateWorkflow<'a> {
    locks: LockCoordinator,
    index: IndexStore,
    clock: Arc<dyn Clock>,
    cdn: Option<Cdn<'a>>,
}

impl<'a> IndexUpdateWorkflow<'a> {
    pub fn new(locks: LockCoordinator, index: IndexStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            locks,
            index,
            clock,
            cdn: None,
        }
    }

    /// Invalidate `/<index key>` on `distribution_id` after each successful
    /// update.
    #[must_use]
    pub fn with_invalidation(
        mut self,
        invalidator: &'a dyn CacheInvalidator,
        distribution_id: impl Into<String>,
    ) -> Self {
        self.cdn = Some(Cdn {
            invalidator,
            distribution_id: distribution_id.into(),
        });
        self
    }

    /// Adds `record` under `timestamp` and `path` in the index at
    /// `bucket/index_key`.
    ///
    /// The lock is released on every path once acquired. Invalidation
    /// failures are logged and reported as `invalidated: false`.
    ///
    /// # Errors
    /// [`PublishError::Conflict`] if the index already holds a different
    /// value at the same path (the index is not written), or a store error.
    pub fn publish(
        &self,
        bucket: &str,
        index_key: &str,
        timestamp: &BuildTimestamp,
        path: &ArtifactPath,
        record: &ArtifactRecord,
    ) -> Result<PublishReport, PublishError> {
        let incoming = nested_record(timestamp, path, record);
        let (versions, handle) =
            self.locks
                .with_lock(bucket, index_key, |_| -> Result<usize, PublishError> {
                    let current = self.index.load_or_empty(bucket, index_key)?;
                    let merged = merge_documents(current, &incoming)?;
                    self.index.save(bucket, index_key, &merged)?;
                    Ok(merged.len())
                })?;
        info!(bucket, index_key, %timestamp, %path, "artifact recorded");
        let invalidated = self.invalidate(index_key);
        Ok(PublishReport {
            bucket: bucket.to_string(),
            index_key: index_key.to_string(),
            timestamp: timestamp.to_string(),
            path: path.to_string(),
            lock: handle.outcome(),
            waited_secs: handle.waited().as_secs_f64(),
            versions,
            invalidated,
        })
    }

    fn invalidate(&self, key: &str) -> bool {
        let Some(cdn) = &self.cdn else {
            return false;
        };
        let path = invalidation_path(key);
        let result = caller_reference(self.clock.wall_clock()).and_then(|reference| {
            cdn.invalidator
                .invalidate(&cdn.distribution_id, &path, &reference)
        });
        match result {
            Ok(()) => {
                info!(distribution_id = %cdn.distribution_id, %path, "cache invalidation requested");
                true
            }
            Err(err) => {
                warn!(
                    distribution_id = %cdn.distribution_id,
                    %path,
                    error = %err,
                    "cache invalidation failed"
                );
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub bucket: String,
    pub index_key: String,
    /// `YYYYMMDD.HHMMSS`; the current UTC time when unset.
    pub timestamp: Option<String>,
    /// Slash separated, e.g. `ros2/desktop/focal`.
    pub artifact_path: String,
    pub file: String,
    pub checksum: String,
    /// Overrides the configured distribution.
    pub distribution_id: Option<String>,
}

/// Runs [`IndexUpdateWorkflow::publish`] for a CLI request.
///
/// # Errors
/// Only unexpected failures; input and store problems become outcomes.
pub fn publish_command(ctx: &CommandContext, request: &PublishRequest) -> Result<ExecutionOutcome> {
    let timestamp = match request.timestamp.as_deref() {
        Some(raw) => BuildTimestamp::parse(raw),
        None => BuildTimestamp::from_instant(ctx.clock().wall_clock()),
    };
    let timestamp = match timestamp {
        Ok(timestamp) => timestamp,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                err.to_string(),
                json!({ "reason": "invalid_timestamp" }),
            ))
        }
    };
    let path = match ArtifactPath::parse(&request.artifact_path) {
        Ok(path) => path,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                err.to_string(),
                json!({ "reason": "invalid_artifact_path" }),
            ))
        }
    };
    let record = ArtifactRecord::new(&request.file, &request.checksum);

    let mut workflow =
        IndexUpdateWorkflow::new(ctx.lock_coordinator(), ctx.index_store(), ctx.clock());
    let distribution_id = request
        .distribution_id
        .as_deref()
        .or(ctx.config().distribution_id.as_deref());
    if let Some(distribution_id) = distribution_id {
        match ctx.invalidator() {
            Some(invalidator) => {
                workflow = workflow.with_invalidation(invalidator, distribution_id);
            }
            None => warn!(distribution_id, "no CDN client available, skipping invalidation"),
        }
    }

    match workflow.publish(
        &request.bucket,
        &request.index_key,
        &timestamp,
        &path,
        &record,
    ) {
        Ok(report) => {
            let message = format!(
                "recorded {} at {} in {}",
                report.path, report.timestamp, report.index_key
            );
            Ok(ExecutionOutcome::success(message, serde_json::to_value(&report)?))
        }
        Err(PublishError::Conflict(conflict)) => Ok(ExecutionOutcome::user_error(
            conflict.to_string(),
            json!({
                "reason": "merge_conflict",
                "code": crate::diagnostics::publish::MERGE_CONFLICT,
                "path": conflict.path(),
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::failure(
            err.to_string(),
            json!({ "reason": "store_error", "code": err.code() }),
        )),
    }
}
