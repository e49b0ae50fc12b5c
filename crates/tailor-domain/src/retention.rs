//! Retention planning for published images.

use std::collections::{BTreeMap, BTreeSet};

use crate::image::ImageEntry;
use crate::index::IndexDocument;
use crate::timestamp::BuildTimestamp;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Newest versions to keep per image name and extension. `Some(0)` keeps
    /// the rule inert rather than deleting everything.
    pub num_to_keep: Option<usize>,
    /// Versions strictly older than this are deleted.
    pub keep_since: Option<BuildTimestamp>,
}

/// Images that fall outside `policy`. Both rules apply independently and their
/// results are combined.
pub fn build_deletion_list(
    images: &[ImageEntry],
    policy: &RetentionPolicy,
) -> BTreeSet<ImageEntry> {
    let mut versions: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
    for image in images {
        versions
            .entry((image.name.as_str(), image.extension.as_str()))
            .or_default()
            .insert(image.version.as_str());
    }

    let mut delete = BTreeSet::new();
    for ((name, extension), version_set) in versions {
        let sorted: Vec<&str> = version_set.into_iter().collect();
        let mut doomed: BTreeSet<&str> = BTreeSet::new();

        if let Some(keep) = policy.num_to_keep {
            if keep > 0 && sorted.len() > keep {
                doomed.extend(&sorted[..sorted.len() - keep]);
            }
        }
        if let Some(cutoff) = &policy.keep_since {
            let oldest_kept = sorted.partition_point(|version| *version < cutoff.as_str());
            doomed.extend(&sorted[..oldest_kept]);
        }

        delete.extend(
            doomed
                .into_iter()
                .map(|version| ImageEntry::new(name, version, extension)),
        );
    }
    delete
}

/// Drops every index version that no kept image refers to and returns the
/// removed versions in ascending order.
pub fn cleanup_index<'a, I>(index: &mut IndexDocument, keep: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ImageEntry>,
{
    let kept: BTreeSet<&str> = keep.into_iter().map(|image| image.version.as_str()).collect();
    let mut removed: Vec<String> = index
        .versions()
        .filter(|version| !kept.contains(version))
        .map(ToOwned::to_owned)
        .collect();
    removed.sort();
    for version in &removed {
        index.remove_version(version);
    }
    removed
}
