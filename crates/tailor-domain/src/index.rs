//! The shared image index: build timestamp -> category -> flavour ->
//! distribution -> artifact record.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timestamp::BuildTimestamp;

/// Body written when an index object is created by the lock protocol.
pub const EMPTY_INDEX_BODY: &[u8] = b"{}";

#[derive(Debug, thiserror::Error)]
pub enum IndexFormatError {
    #[error("index is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("index must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid artifact path '{0}': segments must be non-empty")]
    InvalidArtifactPath(String),
}

/// A published file and its checksum, the leaf record of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub file: String,
    pub checksum: String,
}

impl ArtifactRecord {
    pub fn new(file: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            checksum: checksum.into(),
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("file".to_string(), Value::String(self.file.clone()));
        map.insert("checksum".to_string(), Value::String(self.checksum.clone()));
        Value::Object(map)
    }
}

/// Key sequence below the timestamp, e.g. `ros2/desktop/focal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath(Vec<String>);

impl ArtifactPath {
    pub fn new<I, S>(segments: I) -> Result<Self, IndexFormatError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(IndexFormatError::InvalidArtifactPath(segments.join("/")));
        }
        Ok(Self(segments))
    }

    /// Parses a slash separated path.
    pub fn parse(raw: &str) -> Result<Self, IndexFormatError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(IndexFormatError::InvalidArtifactPath(raw.to_string()));
        }
        Self::new(trimmed.split('/'))
            .map_err(|_| IndexFormatError::InvalidArtifactPath(raw.to_string()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexDocument(Map<String, Value>);

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Build versions (top-level keys) currently recorded.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn version(&self, version: &str) -> Option<&Value> {
        self.0.get(version)
    }

    pub fn remove_version(&mut self, version: &str) -> Option<Value> {
        self.0.remove(version)
    }

    /// Looks up a value by key sequence starting at the top level.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }
}

impl From<Map<String, Value>> for IndexDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Builds `{timestamp: {seg0: {seg1: ... {file, checksum}}}}`.
pub fn nested_record(
    timestamp: &BuildTimestamp,
    path: &ArtifactPath,
    record: &ArtifactRecord,
) -> IndexDocument {
    let mut value = record.to_value();
    for segment in path.segments().iter().rev() {
        let mut map = Map::new();
        map.insert(segment.clone(), value);
        value = Value::Object(map);
    }
    let mut root = Map::new();
    root.insert(timestamp.as_str().to_string(), value);
    IndexDocument(root)
}

pub fn parse_index(bytes: &[u8]) -> Result<IndexDocument, IndexFormatError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(IndexDocument(map)),
        Value::Null => Err(IndexFormatError::NotAnObject("null")),
        Value::Bool(_) => Err(IndexFormatError::NotAnObject("a boolean")),
        Value::Number(_) => Err(IndexFormatError::NotAnObject("a number")),
        Value::String(_) => Err(IndexFormatError::NotAnObject("a string")),
        Value::Array(_) => Err(IndexFormatError::NotAnObject("an array")),
    }
}

/// Pretty-printed with two-space indentation so mirrored copies diff cleanly.
pub fn render_index(document: &IndexDocument) -> Result<String, IndexFormatError> {
    Ok(serde_json::to_string_pretty(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp() -> BuildTimestamp {
        BuildTimestamp::parse("20240105.093000").expect("timestamp")
    }

    #[test]
    fn nested_record_wraps_record_under_every_segment() {
        let path = ArtifactPath::parse("ros2/desktop/focal").expect("path");
        let record = ArtifactRecord::new("desktop_20240105.093000.img", "abc123");
        let doc = nested_record(&stamp(), &path, &record);
        assert_eq!(
            serde_json::to_value(&doc).expect("value"),
            json!({
                "20240105.093000": {
                    "ros2": {"desktop": {"focal": {"file": "desktop_20240105.093000.img", "checksum": "abc123"}}}
                }
            })
        );
        assert_eq!(
            doc.lookup(&["20240105.093000", "ros2", "desktop", "focal", "checksum"]),
            Some(&json!("abc123"))
        );
    }

    #[test]
    fn artifact_path_rejects_empty_segments() {
        assert!(ArtifactPath::parse("").is_err());
        assert!(ArtifactPath::parse("ros2//focal").is_err());
        assert!(ArtifactPath::new(Vec::<String>::new()).is_err());
        let path = ArtifactPath::parse("/ros2/focal/").expect("leading/trailing slashes");
        assert_eq!(path.segments(), ["ros2", "focal"]);
        assert_eq!(path.to_string(), "ros2/focal");
    }

    #[test]
    fn parse_index_requires_an_object() {
        assert!(parse_index(EMPTY_INDEX_BODY).expect("empty").is_empty());
        assert!(matches!(
            parse_index(b"[1, 2]"),
            Err(IndexFormatError::NotAnObject("an array"))
        ));
        assert!(matches!(parse_index(b"{"), Err(IndexFormatError::Json(_))));
    }

    #[test]
    fn render_index_uses_two_space_indent() {
        let doc = parse_index(br#"{"20240105.093000": {"file": "a"}}"#).expect("doc");
        let rendered = render_index(&doc).expect("render");
        assert_eq!(
            rendered,
            "{\n  \"20240105.093000\": {\n    \"file\": \"a\"\n  }\n}"
        );
        assert_eq!(parse_index(rendered.as_bytes()).expect("reparse"), doc);
    }
}
