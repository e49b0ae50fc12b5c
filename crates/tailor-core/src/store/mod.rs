//! Object store seam: bodies, tags and listings keyed by bucket and key.

mod local;
mod location;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use local::LocalStore;
pub use location::{open_store, StoreLocation};
pub use memory::{MemoryStore, StoreCall, StoreOp};
#[cfg(feature = "s3")]
pub(crate) use s3::{blocking_runtime, load_sdk_config};
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// Errors surfaced by object store backends.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("[TI301] object {bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },
    #[error("[TI302] method not allowed on {bucket}/{key}")]
    MethodNotAllowed { bucket: String, key: String },
    #[error("[TI310] store request for {bucket}/{key} failed: {message}")]
    Backend {
        bucket: String,
        key: String,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn backend(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Both `NotFound` and `MethodNotAllowed` mean the object is not there;
    /// S3 answers tag reads on a deleted versioned object with the latter.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MethodNotAllowed { .. })
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => crate::diagnostics::store::NOT_FOUND,
            Self::MethodNotAllowed { .. } => crate::diagnostics::store::METHOD_NOT_ALLOWED,
            Self::Backend { .. } => crate::diagnostics::store::BACKEND,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capabilities the index protocol needs from a backing store.
///
/// Tags live outside the object body: writing a body leaves tags alone and
/// writing a tag leaves the body alone.
pub trait ObjectStore: Send + Sync {
    /// Reads one tag. `Ok(None)` means the object exists without that tag.
    fn get_tag(&self, bucket: &str, key: &str, tag: &str) -> StoreResult<Option<String>>;

    /// Sets one tag on an existing object, replacing the tag set.
    fn put_tag(&self, bucket: &str, key: &str, tag: &str, value: &str) -> StoreResult<()>;

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Writes a body. `initial_tags` are applied in the same request so a new
    /// object is never observable without them; an empty slice leaves the
    /// tags of an existing object untouched.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        initial_tags: &[(&str, &str)],
    ) -> StoreResult<()>;

    /// Keys under `prefix`, sorted.
    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Removes an object, including every stored version where the backend
    /// keeps them.
    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Short backend label for logs.
    fn describe(&self) -> String;
}
