use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use url::Url;

use super::{LocalStore, MemoryStore, ObjectStore};

/// Where the index and images live, as given by `--store` or `TAILOR_STORE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process-local, forgotten on exit.
    Memory,
    /// Directory tree, see [`LocalStore`].
    Local(PathBuf),
    /// Amazon S3 (or a compatible endpoint).
    S3 { endpoint: Option<String> },
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self::S3 { endpoint: None }
    }
}

impl StoreLocation {
    /// Accepts `memory://`, `file:///path`, `s3://` (optionally
    /// `s3://?endpoint=http://host:port`) or a bare filesystem path.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("store location is empty");
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Ok(Self::Local(PathBuf::from(raw)));
            }
            Err(err) => return Err(anyhow!("invalid store location '{raw}': {err}")),
        };
        match url.scheme() {
            "memory" => Ok(Self::Memory),
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| anyhow!("invalid file store location '{raw}'")),
            "s3" => {
                let endpoint = url
                    .query_pairs()
                    .find(|(name, _)| name == "endpoint")
                    .map(|(_, value)| value.into_owned());
                Ok(Self::S3 { endpoint })
            }
            other => bail!("unsupported store scheme '{other}' (expected memory, file or s3)"),
        }
    }
}

impl FromStr for StoreLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory://"),
            Self::Local(path) => write!(f, "file://{}", path.display()),
            Self::S3 { endpoint: None } => f.write_str("s3://"),
            Self::S3 {
                endpoint: Some(endpoint),
            } => write!(f, "s3://?endpoint={endpoint}"),
        }
    }
}

/// Instantiates the backend for `location`.
pub fn open_store(location: &StoreLocation) -> Result<Arc<dyn ObjectStore>> {
    match location {
        StoreLocation::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreLocation::Local(root) => Ok(Arc::new(LocalStore::new(root.clone()))),
        #[cfg(feature = "s3")]
        StoreLocation::S3 { endpoint } => {
            Ok(Arc::new(super::S3Store::connect(endpoint.as_deref())?))
        }
        #[cfg(not(feature = "s3"))]
        StoreLocation::S3 { .. } => bail!("this build of tailor does not include S3 support"),
    }
}
