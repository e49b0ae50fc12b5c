use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ObjectStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetTag,
    PutTag,
    GetObject,
    PutObject,
    List,
    Delete,
}

/// One request observed by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Default)]
struct StoredObject {
    body: Vec<u8>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug)]
struct InjectedFailure {
    op: StoreOp,
    error: StoreError,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(String, String), StoredObject>,
    calls: Vec<StoreCall>,
    failures: Vec<InjectedFailure>,
}

/// In-process store that records every request and can be told to fail.
///
/// Shared between threads it behaves like the remote store several workers
/// talk to: each call is atomic, nothing spans calls.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an object without recording a call.
    pub fn insert(&self, bucket: &str, key: &str, body: &[u8], tags: &[(&str, &str)]) {
        let object = StoredObject {
            body: body.to_vec(),
            tags: tags
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        };
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), object);
    }

    #[must_use]
    pub fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.body.clone())
    }

    #[must_use]
    pub fn tag(&self, bucket: &str, key: &str, tag: &str) -> Option<String> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|object| object.tags.get(tag).cloned())
    }

    /// Every subsequent `op` fails with `error`.
    pub fn fail(&self, op: StoreOp, error: StoreError) {
        self.state().failures.push(InjectedFailure {
            op,
            error,
            remaining: None,
        });
    }

    /// The next `op` fails with `error`.
    pub fn fail_once(&self, op: StoreOp, error: StoreError) {
        self.state().failures.push(InjectedFailure {
            op,
            error,
            remaining: Some(1),
        });
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn count(&self, op: StoreOp) -> usize {
        self.state().calls.iter().filter(|call| call.op == op).count()
    }

    fn begin(&self, op: StoreOp, bucket: &str, key: &str) -> StoreResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(StoreCall {
            op,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if let Some(position) = state.failures.iter().position(|failure| failure.op == op) {
            let failure = &mut state.failures[position];
            let error = failure.error.clone();
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    state.failures.remove(position);
                }
            }
            return Err(error);
        }
        Ok(state)
    }
}

fn slot(bucket: &str, key: &str) -> (String, String) {
    (bucket.to_string(), key.to_string())
}

impl ObjectStore for MemoryStore {
    fn get_tag(&self, bucket: &str, key: &str, tag: &str) -> StoreResult<Option<String>> {
        let state = self.begin(StoreOp::GetTag, bucket, key)?;
        state
            .objects
            .get(&slot(bucket, key))
            .map(|object| object.tags.get(tag).cloned())
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn put_tag(&self, bucket: &str, key: &str, tag: &str, value: &str) -> StoreResult<()> {
        let mut state = self.begin(StoreOp::PutTag, bucket, key)?;
        let object = state
            .objects
            .get_mut(&slot(bucket, key))
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        object.tags = BTreeMap::from([(tag.to_string(), value.to_string())]);
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let state = self.begin(StoreOp::GetObject, bucket, key)?;
        state
            .objects
            .get(&slot(bucket, key))
            .map(|object| object.body.clone())
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        initial_tags: &[(&str, &str)],
    ) -> StoreResult<()> {
        let mut state = self.begin(StoreOp::PutObject, bucket, key)?;
        let object = state.objects.entry(slot(bucket, key)).or_default();
        object.body = body.to_vec();
        if !initial_tags.is_empty() {
            object.tags = initial_tags
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect();
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let state = self.begin(StoreOp::List, bucket, prefix)?;
        Ok(state
            .objects
            .keys()
            .filter(|(object_bucket, key)| object_bucket == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut state = self.begin(StoreOp::Delete, bucket, key)?;
        state.objects.remove(&slot(bucket, key));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_bodies_are_independent() {
        let store = MemoryStore::new();
        store
            .put_object("repo", "index", b"{}", &[("Lock", "True")])
            .expect("create");
        store
            .put_object("repo", "index", b"{\"a\": 1}", &[])
            .expect("overwrite");
        assert_eq!(store.tag("repo", "index", "Lock").as_deref(), Some("True"));
        store.put_tag("repo", "index", "Lock", "False").expect("tag");
        assert_eq!(store.body("repo", "index").as_deref(), Some(&b"{\"a\": 1}"[..]));
        assert_eq!(
            store.get_tag("repo", "index", "Lock").expect("read"),
            Some("False".to_string())
        );
        assert_eq!(store.get_tag("repo", "index", "Other").expect("read"), None);
    }

    #[test]
    fn missing_objects_report_not_found() {
        let store = MemoryStore::new();
        let err = store.get_tag("repo", "index", "Lock").expect_err("absent");
        assert!(err.is_absent());
        assert!(store.put_tag("repo", "index", "Lock", "True").is_err());
        assert_eq!(store.count(StoreOp::GetTag), 1);
        assert_eq!(store.count(StoreOp::PutTag), 1);
    }

    #[test]
    fn injected_failures_fire_once_or_forever() {
        let store = MemoryStore::new();
        store.insert("repo", "index", b"{}", &[]);
        store.fail_once(StoreOp::GetObject, StoreError::backend("repo", "index", "boom"));
        assert!(store.get_object("repo", "index").is_err());
        assert!(store.get_object("repo", "index").is_ok());

        store.fail(StoreOp::Delete, StoreError::backend("repo", "index", "denied"));
        assert!(store.delete_object("repo", "index").is_err());
        assert!(store.delete_object("repo", "index").is_err());
        assert!(store.body("repo", "index").is_some());
    }

    #[test]
    fn listing_filters_by_bucket_and_prefix() {
        let store = MemoryStore::new();
        store.insert("repo", "a/images/one", b"", &[]);
        store.insert("repo", "a/images/two", b"", &[]);
        store.insert("repo", "b/images/three", b"", &[]);
        store.insert("other", "a/images/four", b"", &[]);
        assert_eq!(
            store.list_objects("repo", "a/images").expect("list"),
            vec!["a/images/one", "a/images/two"]
        );
    }
}
