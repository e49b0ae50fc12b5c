use std::sync::Arc;

use tailor_domain::{parse_index, render_index, IndexDocument};
use tracing::{debug, info};

use crate::error::IndexError;
use crate::store::ObjectStore;

/// Reads and writes the index body. Holds no lock of its own; callers are
/// expected to hold the index lock around a load/save pair.
#[derive(Clone)]
pub struct IndexStore {
    store: Arc<dyn ObjectStore>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `IndexError::Store(StoreError::NotFound)` when the object is absent,
    /// `IndexError::Decode` when the body is not a JSON object.
    pub fn load(&self, bucket: &str, key: &str) -> Result<IndexDocument, IndexError> {
        let bytes = self.store.get_object(bucket, key)?;
        let document = parse_index(&bytes).map_err(|source| IndexError::Decode {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;
        debug!(bucket, key, versions = document.len(), "index loaded");
        Ok(document)
    }

    /// Like [`IndexStore::load`], with a missing object read as `{}`.
    ///
    /// # Errors
    /// Any load error other than the object being absent.
    pub fn load_or_empty(&self, bucket: &str, key: &str) -> Result<IndexDocument, IndexError> {
        match self.load(bucket, key) {
            Err(err) if err.is_not_found() => {
                info!(bucket, key, "index does not exist, starting empty");
                Ok(IndexDocument::new())
            }
            other => other,
        }
    }

    /// Overwrites the body; tags on the object are left as they are.
    ///
    /// # Errors
    /// Encoding or store failures.
    pub fn save(&self, bucket: &str, key: &str, document: &IndexDocument) -> Result<(), IndexError> {
        let body = render_index(document).map_err(IndexError::Encode)?;
        self.store.put_object(bucket, key, body.as_bytes(), &[])?;
        info!(bucket, key, versions = document.len(), "index saved");
        Ok(())
    }
}
