//! Read-only views of the index and manual lock recovery.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::CommandContext;
use crate::lock::{LOCKED, LOCK_TAG, UNLOCKED};
use crate::outcome::ExecutionOutcome;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct IndexShowRequest {
    pub bucket: String,
    pub index_key: String,
    /// Show only this build version.
    pub version: Option<String>,
}

/// Prints the index without taking the lock.
///
/// # Errors
/// Only unexpected failures.
pub fn index_show(ctx: &CommandContext, request: &IndexShowRequest) -> Result<ExecutionOutcome> {
    let document = match ctx.index_store().load(&request.bucket, &request.index_key) {
        Ok(document) => document,
        Err(err) if err.is_not_found() => {
            return Ok(ExecutionOutcome::user_error(
                format!("index {}/{} does not exist", request.bucket, request.index_key),
                json!({ "reason": "index_missing", "code": err.code() }),
            ))
        }
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                err.to_string(),
                json!({ "reason": "store_error", "code": err.code() }),
            ))
        }
    };
    let versions: Vec<String> = document.versions().map(ToOwned::to_owned).collect();
    match request.version.as_deref() {
        Some(version) => match document.version(version) {
            Some(entry) => Ok(ExecutionOutcome::success(
                format!("version {version}"),
                json!({ "version": version, "entry": entry }),
            )),
            None => Ok(ExecutionOutcome::user_error(
                format!("version {version} is not in the index"),
                json!({ "reason": "version_missing", "versions": versions }),
            )),
        },
        None => Ok(ExecutionOutcome::success(
            format!("{} versions", versions.len()),
            json!({ "versions": versions, "index": Value::Object(document.into_map()) }),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct LockRequest {
    pub bucket: String,
    pub key: String,
}

fn store_failure(err: &StoreError) -> ExecutionOutcome {
    ExecutionOutcome::failure(
        err.to_string(),
        json!({ "reason": "store_error", "code": err.code() }),
    )
}

/// Reports the `Lock` tag: `locked`, `unlocked`, `unset` or `absent`.
///
/// # Errors
/// Only unexpected failures.
pub fn lock_status(ctx: &CommandContext, request: &LockRequest) -> Result<ExecutionOutcome> {
    let state = match ctx.store().get_tag(&request.bucket, &request.key, LOCK_TAG) {
        Ok(Some(value)) if value == LOCKED => "locked",
        Ok(Some(value)) if value == UNLOCKED => "unlocked",
        Ok(_) => "unset",
        Err(err) if err.is_absent() => "absent",
        Err(err) => return Ok(store_failure(&err)),
    };
    Ok(ExecutionOutcome::success(
        format!("{}/{} is {state}", request.bucket, request.key),
        json!({ "bucket": request.bucket, "key": request.key, "state": state }),
    ))
}

/// Forces the tag to `False`, for locks left behind by a killed worker.
///
/// # Errors
/// Only unexpected failures.
pub fn lock_release(ctx: &CommandContext, request: &LockRequest) -> Result<ExecutionOutcome> {
    match ctx
        .store()
        .put_tag(&request.bucket, &request.key, LOCK_TAG, UNLOCKED)
    {
        Ok(()) => {
            warn!(bucket = %request.bucket, key = %request.key, "lock released by hand");
            Ok(ExecutionOutcome::success(
                format!("released {}/{}", request.bucket, request.key),
                json!({ "bucket": request.bucket, "key": request.key, "state": "unlocked" }),
            ))
        }
        Err(err) if err.is_absent() => Ok(ExecutionOutcome::user_error(
            format!("{}/{} does not exist", request.bucket, request.key),
            json!({ "reason": "object_missing", "code": err.code() }),
        )),
        Err(err) => Ok(store_failure(&err)),
    }
}
