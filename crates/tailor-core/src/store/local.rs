use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::trace;
use walkdir::WalkDir;

use super::{ObjectStore, StoreError, StoreResult};

const TAGS_DIR: &str = ".tags";

/// Directory-backed store: `<root>/<bucket>/<key>` holds the body and
/// `<root>/<bucket>/.tags/<key>.json` the tag set.
///
/// Bodies and tags are replaced through a rename, so readers never see a
/// partial write. A new object's tags are written before its body, which makes
/// the body the point at which the object starts to exist.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(StoreError::backend(bucket, key, "invalid bucket name"));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || !is_plain_relative(relative) || key.starts_with(TAGS_DIR) {
            return Err(StoreError::backend(bucket, key, "invalid object key"));
        }
        Ok(self.bucket_dir(bucket, key)?.join(relative))
    }

    fn tags_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        self.object_path(bucket, key)?;
        Ok(self
            .bucket_dir(bucket, key)?
            .join(TAGS_DIR)
            .join(format!("{key}.json")))
    }

    fn require_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        if self.object_path(bucket, key)?.is_file() {
            Ok(())
        } else {
            Err(StoreError::not_found(bucket, key))
        }
    }

    fn read_tags(&self, bucket: &str, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let path = self.tags_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StoreError::backend(bucket, key, format!("corrupt tags {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(io_failure(bucket, key, &path, &err)),
        }
    }

    fn write_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &BTreeMap<String, String>,
    ) -> StoreResult<()> {
        let path = self.tags_path(bucket, key)?;
        let bytes = serde_json::to_vec(tags)
            .map_err(|err| StoreError::backend(bucket, key, err.to_string()))?;
        write_atomic(&path, &bytes).map_err(|err| io_failure(bucket, key, &path, &err))
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

fn io_failure(bucket: &str, key: &str, path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::backend(bucket, key, format!("{}: {err}", path.display()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

impl ObjectStore for LocalStore {
    fn get_tag(&self, bucket: &str, key: &str, tag: &str) -> StoreResult<Option<String>> {
        self.require_object(bucket, key)?;
        Ok(self.read_tags(bucket, key)?.remove(tag))
    }

    fn put_tag(&self, bucket: &str, key: &str, tag: &str, value: &str) -> StoreResult<()> {
        self.require_object(bucket, key)?;
        let tags = BTreeMap::from([(tag.to_string(), value.to_string())]);
        self.write_tags(bucket, key, &tags)?;
        trace!(bucket, key, tag, value, "tag written");
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(bucket, key))
            }
            Err(err) => Err(io_failure(bucket, key, &path, &err)),
        }
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        initial_tags: &[(&str, &str)],
    ) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        if !initial_tags.is_empty() {
            let tags = initial_tags
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect();
            self.write_tags(bucket, key, &tags)?;
        }
        write_atomic(&path, body).map_err(|err| io_failure(bucket, key, &path, &err))?;
        trace!(bucket, key, bytes = body.len(), "object written");
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.bucket_dir(bucket, prefix)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != TAGS_DIR);
        for entry in walker {
            let entry = entry.map_err(|err| StoreError::backend(bucket, prefix, err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // tempfile leftovers from interrupted writes
            if key.rsplit('/').next().is_some_and(|name| name.starts_with(".tmp")) {
                continue;
            }
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        remove_if_present(&path).map_err(|err| io_failure(bucket, key, &path, &err))?;
        let tags = self.tags_path(bucket, key)?;
        remove_if_present(&tags).map_err(|err| io_failure(bucket, key, &tags, &err))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
