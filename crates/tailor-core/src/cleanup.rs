//! Retention: deletes old images of an organization and drops their versions
//! from the index.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tailor_domain::{
    build_deletion_list, cleanup_index, parse_image_name, BuildTimestamp, ImageEntry,
    IndexDocument, RetentionPolicy,
};
use tracing::{debug, info};

use crate::config::CommandContext;
use crate::error::CleanupError;
use crate::index_store::IndexStore;
use crate::lock::{LockCoordinator, LockOutcome};
use crate::outcome::ExecutionOutcome;
use crate::store::ObjectStore;

#[must_use]
pub fn image_prefix(release_label: &str) -> String {
    format!("{release_label}/images")
}

#[must_use]
pub fn index_key(release_label: &str) -> String {
    format!("{release_label}/images/index")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub bucket: String,
    pub index_key: String,
    pub dry_run: bool,
    /// Image objects found under the organization prefix.
    pub scanned: usize,
    /// Object keys deleted, or that would be in a dry run.
    pub deleted: Vec<String>,
    pub removed_versions: Vec<String>,
    pub remaining_versions: Vec<String>,
    /// `None` for dry runs, which never take the lock.
    pub lock: Option<LockOutcome>,
}

pub struct CleanupWorkflow {
    store: Arc<dyn ObjectStore>,
    locks: LockCoordinator,
    index: IndexStore,
}

impl CleanupWorkflow {
    pub fn new(store: Arc<dyn ObjectStore>, locks: LockCoordinator, index: IndexStore) -> Self {
        Self {
            store,
            locks,
            index,
        }
    }

    /// Applies `policy` to the images under
    /// `<release_label>/images/<organization>` and prunes the index to the
    /// versions that still have an image.
    ///
    /// A dry run lists and reads but writes nothing.
    ///
    /// # Errors
    /// Store and index failures; deletions made before a failure stay done.
    pub fn run(
        &self,
        bucket: &str,
        release_label: &str,
        organization: &str,
        policy: &RetentionPolicy,
        dry_run: bool,
    ) -> Result<CleanupReport, CleanupError> {
        let listing_prefix = format!("{}/{organization}", image_prefix(release_label));
        // copies of one image under different keys are all deleted together
        let mut images: BTreeMap<ImageEntry, Vec<String>> = BTreeMap::new();
        for key in self.store.list_objects(bucket, &listing_prefix)? {
            match parse_image_name(&key) {
                Some(image) => images.entry(image).or_default().push(key),
                None => debug!(key, "skipping object without an image version"),
            }
        }
        let entries: Vec<ImageEntry> = images.keys().cloned().collect();
        let doomed = build_deletion_list(&entries, policy);

        let mut deleted = Vec::new();
        for (image, keys) in &images {
            if !doomed.contains(image) {
                continue;
            }
            for key in keys {
                if dry_run {
                    info!(key, "dry run, would delete image");
                } else {
                    info!(key, "deleting image");
                    self.store.delete_object(bucket, key)?;
                }
                deleted.push(key.clone());
            }
        }
        let keep: Vec<&ImageEntry> = entries.iter().filter(|image| !doomed.contains(*image)).collect();

        let index_key = index_key(release_label);
        let prune = |mut document: IndexDocument| {
            let removed = cleanup_index(&mut document, keep.iter().copied());
            (document, removed)
        };
        let ((document, removed_versions), lock) = if dry_run {
            (prune(self.index.load_or_empty(bucket, &index_key)?), None)
        } else {
            let (pruned, handle) =
                self.locks
                    .with_lock(bucket, &index_key, |_| -> Result<_, CleanupError> {
                        let pruned = prune(self.index.load_or_empty(bucket, &index_key)?);
                        self.index.save(bucket, &index_key, &pruned.0)?;
                        Ok(pruned)
                    })?;
            (pruned, Some(handle.outcome()))
        };
        for version in &removed_versions {
            info!(version, dry_run, "dropping index version");
        }

        Ok(CleanupReport {
            bucket: bucket.to_string(),
            index_key,
            dry_run,
            scanned: images.values().map(Vec::len).sum(),
            deleted,
            removed_versions,
            remaining_versions: document.versions().map(ToOwned::to_owned).collect(),
            lock,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CleanupRequest {
    pub bucket: String,
    pub release_label: String,
    pub organization: String,
    /// Images older than this many days are deleted.
    pub days_to_keep: Option<u32>,
    /// Newest images to keep per name and extension.
    pub num_to_keep: Option<usize>,
    pub dry_run: bool,
}

impl CleanupRequest {
    /// # Errors
    /// Fails if the age cutoff falls outside the years a build version can
    /// name.
    pub fn policy(&self, now: time::OffsetDateTime) -> Result<RetentionPolicy, CleanupError> {
        let keep_since = match self.days_to_keep {
            Some(days) => {
                let cutoff = now
                    .checked_sub(time::Duration::days(i64::from(days)))
                    .ok_or_else(|| {
                        CleanupError::InvalidPolicy(format!(
                            "keeping {days} days reaches before the earliest supported date"
                        ))
                    })?;
                Some(BuildTimestamp::from_instant(cutoff)?)
            }
            None => None,
        };
        Ok(RetentionPolicy {
            num_to_keep: self.num_to_keep,
            keep_since,
        })
    }
}

/// # Errors
/// Only unexpected failures; store problems become outcomes.
pub fn cleanup_command(ctx: &CommandContext, request: &CleanupRequest) -> Result<ExecutionOutcome> {
    let workflow = CleanupWorkflow::new(ctx.store(), ctx.lock_coordinator(), ctx.index_store());
    let result = request.policy(ctx.clock().wall_clock()).and_then(|policy| {
        workflow.run(
            &request.bucket,
            &request.release_label,
            &request.organization,
            &policy,
            request.dry_run,
        )
    });
    match result {
        Ok(report) => {
            let message = if report.dry_run {
                format!(
                    "dry run: would delete {} of {} images, index would keep {} versions",
                    report.deleted.len(),
                    report.scanned,
                    report.remaining_versions.len()
                )
            } else {
                format!(
                    "deleted {} of {} images, index keeps {} versions",
                    report.deleted.len(),
                    report.scanned,
                    report.remaining_versions.len()
                )
            };
            Ok(ExecutionOutcome::success(message, serde_json::to_value(&report)?))
        }
        Err(err) if err.is_user_error() => Ok(ExecutionOutcome::user_error(
            err.to_string(),
            json!({ "reason": "invalid_policy", "code": err.code() }),
        )),
        Err(err) => Ok(ExecutionOutcome::failure(
            err.to_string(),
            json!({ "reason": "store_error", "code": err.code() }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lock::{LockPolicy, LOCK_TAG, UNLOCKED};
    use crate::store::{MemoryStore, StoreOp};
    use serde_json::Value;
    use time::macros::datetime;

    const BUCKET: &str = "apt-repo";

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for version in ["20240101.000000", "20240201.000000", "20240301.000000"] {
            store.insert(
                BUCKET,
                &format!("hotdog/images/acme/desktop_{version}.img"),
                b"image",
                &[],
            );
        }
        store.insert(BUCKET, "hotdog/images/acme/README", b"", &[]);
        store.insert(
            BUCKET,
            "hotdog/images/index",
            br#"{
                "20240101.000000": {"ros2": {"file": "desktop_20240101.000000.img"}},
                "20240201.000000": {"ros2": {"file": "desktop_20240201.000000.img"}},
                "20240301.000000": {"ros2": {"file": "desktop_20240301.000000.img"}},
                "20231201.000000": {"ros2": {"file": "gone.img"}}
            }"#,
            &[(LOCK_TAG, UNLOCKED)],
        );
        store
    }

    fn workflow(store: &Arc<MemoryStore>) -> CleanupWorkflow {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-15 00:00:00 UTC)));
        let policy = LockPolicy {
            seed: Some(3),
            ..LockPolicy::default()
        };
        CleanupWorkflow::new(
            store.clone(),
            LockCoordinator::new(store.clone(), clock, policy),
            IndexStore::new(store.clone()),
        )
    }

    fn keep_newest(count: usize) -> RetentionPolicy {
        RetentionPolicy {
            num_to_keep: Some(count),
            keep_since: None,
        }
    }

    #[test]
    fn keeps_newest_and_prunes_index() {
        let store = seeded_store();
        let report = workflow(&store)
            .run(BUCKET, "hotdog", "acme", &keep_newest(1), false)
            .expect("cleanup");

        assert_eq!(report.scanned, 3);
        assert_eq!(
            report.deleted,
            vec![
                "hotdog/images/acme/desktop_20240101.000000.img",
                "hotdog/images/acme/desktop_20240201.000000.img",
            ]
        );
        assert_eq!(
            report.removed_versions,
            vec!["20231201.000000", "20240101.000000", "20240201.000000"]
        );
        assert_eq!(report.remaining_versions, vec!["20240301.000000"]);
        assert_eq!(report.lock, Some(LockOutcome::Acquired));

        assert!(store
            .body(BUCKET, "hotdog/images/acme/desktop_20240101.000000.img")
            .is_none());
        assert!(store
            .body(BUCKET, "hotdog/images/acme/desktop_20240301.000000.img")
            .is_some());
        let index: Value =
            serde_json::from_slice(&store.body(BUCKET, "hotdog/images/index").expect("index"))
                .expect("json");
        assert_eq!(index.as_object().map(serde_json::Map::len), Some(1));
        assert_eq!(
            store.tag(BUCKET, "hotdog/images/index", LOCK_TAG).as_deref(),
            Some(UNLOCKED)
        );
    }

    #[test]
    fn age_rule_uses_cutoff_version() {
        let store = seeded_store();
        let policy = RetentionPolicy {
            num_to_keep: None,
            keep_since: Some(BuildTimestamp::parse("20240201.000000").expect("cutoff")),
        };
        let report = workflow(&store)
            .run(BUCKET, "hotdog", "acme", &policy, false)
            .expect("cleanup");
        assert_eq!(
            report.deleted,
            vec!["hotdog/images/acme/desktop_20240101.000000.img"]
        );
        assert_eq!(
            report.remaining_versions,
            vec!["20240201.000000", "20240301.000000"]
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let store = seeded_store();
        let before = store.body(BUCKET, "hotdog/images/index");

        let report = workflow(&store)
            .run(BUCKET, "hotdog", "acme", &keep_newest(1), true)
            .expect("cleanup");

        assert!(report.dry_run);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.remaining_versions, vec!["20240301.000000"]);
        assert_eq!(report.lock, None);
        assert_eq!(store.count(StoreOp::Delete), 0);
        assert_eq!(store.count(StoreOp::PutObject), 0);
        assert_eq!(store.count(StoreOp::PutTag), 0);
        assert_eq!(store.body(BUCKET, "hotdog/images/index"), before);
    }

    #[test]
    fn missing_index_is_created_empty() {
        let store = Arc::new(MemoryStore::new());
        let report = workflow(&store)
            .run(BUCKET, "hotdog", "acme", &RetentionPolicy::default(), false)
            .expect("cleanup");
        assert_eq!(report.scanned, 0);
        assert_eq!(report.lock, Some(LockOutcome::Created));
        assert_eq!(
            store.body(BUCKET, "hotdog/images/index").as_deref(),
            Some(&b"{}"[..])
        );
    }

    #[test]
    fn every_copy_of_a_doomed_image_is_deleted() {
        let store = seeded_store();
        store.insert(
            BUCKET,
            "hotdog/images/acme/old/desktop_20240101.000000.img",
            b"image",
            &[],
        );

        let report = workflow(&store)
            .run(BUCKET, "hotdog", "acme", &keep_newest(1), false)
            .expect("cleanup");

        assert_eq!(report.scanned, 4);
        assert_eq!(report.deleted.len(), 3);
        for key in [
            "hotdog/images/acme/desktop_20240101.000000.img",
            "hotdog/images/acme/old/desktop_20240101.000000.img",
            "hotdog/images/acme/desktop_20240201.000000.img",
        ] {
            assert!(report.deleted.iter().any(|deleted| deleted == key), "{key}");
            assert!(store.body(BUCKET, key).is_none(), "{key}");
        }
        assert!(store
            .body(BUCKET, "hotdog/images/acme/desktop_20240301.000000.img")
            .is_some());
    }

    fn request(days_to_keep: u32) -> CleanupRequest {
        CleanupRequest {
            bucket: BUCKET.into(),
            release_label: "hotdog".into(),
            organization: "acme".into(),
            days_to_keep: Some(days_to_keep),
            num_to_keep: Some(2),
            dry_run: false,
        }
    }

    #[test]
    fn unrepresentable_cutoffs_are_policy_errors() {
        let now = datetime!(2024-03-15 06:30:00 UTC);
        for days in [4_000_000, u32::MAX] {
            let err = request(days).policy(now).expect_err("out of range");
            assert!(matches!(err, CleanupError::InvalidPolicy(_)), "{days}: {err}");
            assert!(err.is_user_error());
            assert_eq!(err.code(), "TI210");
        }
    }

    #[test]
    fn days_to_keep_becomes_cutoff() {
        let policy = request(30)
            .policy(datetime!(2024-03-15 06:30:00 UTC))
            .expect("policy");
        assert_eq!(policy.num_to_keep, Some(2));
        assert_eq!(
            policy.keep_since.as_ref().map(BuildTimestamp::as_str),
            Some("20240214.063000")
        );
    }
}
