use tailor_domain::{IndexFormatError, MergeConflict, TimestampError};

use crate::diagnostics;
use crate::store::StoreError;

/// Failures reading or writing the index object.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("[TI120] index {bucket}/{key} is unreadable: {source}")]
    Decode {
        bucket: String,
        key: String,
        #[source]
        source: IndexFormatError,
    },
    #[error("[TI121] failed to encode index: {0}")]
    Encode(#[source] IndexFormatError),
}

impl IndexError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::Decode { .. } => diagnostics::publish::DECODE,
            Self::Encode(_) => diagnostics::publish::ENCODE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Conflict(#[from] MergeConflict),
}

impl PublishError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::Index(err) => err.code(),
            Self::Conflict(_) => diagnostics::publish::MERGE_CONFLICT,
        }
    }

    /// Conflicts are caused by the caller's input, everything else by the
    /// store.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("[TI210] invalid retention policy: {0}")]
    InvalidPolicy(String),
}

impl CleanupError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::Index(err) => err.code(),
            Self::InvalidPolicy(_) => diagnostics::cleanup::INVALID_POLICY,
        }
    }

    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidPolicy(_))
    }
}

impl From<TimestampError> for CleanupError {
    fn from(err: TimestampError) -> Self {
        Self::InvalidPolicy(err.to_string())
    }
}
