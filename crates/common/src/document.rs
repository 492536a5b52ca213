//! Document data model
//!
//! A [`Document`] is one loaded unit of text (a whole file or a single PDF
//! page). Splitting produces [`Chunk`]s with the same shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the provenance of a document
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the position of a chunk in an enriched sequence
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key holding the enrichment timestamp
pub const PROCESSED_AT_KEY: &str = "processed_at";
/// Metadata key holding the 1-based PDF page number
pub const PAGE_KEY: &str = "page";
/// Metadata key holding the PDF page count
pub const TOTAL_PAGES_KEY: &str = "total_pages";
/// First line of a chunk inside its source document (1-based)
pub const LINE_FROM_KEY: &str = "line_from";
/// Last line of a chunk inside its source document (1-based)
pub const LINE_TO_KEY: &str = "line_to";

/// Scalar metadata value
///
/// Serialized untagged so persisted metadata is plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl MetadataValue {
    /// Null and empty-string values carry no information
    pub fn is_blank(&self) -> bool {
        match self {
            MetadataValue::Null => true,
            MetadataValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Null => f.write_str("null"),
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            MetadataValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(value)
    }
}

/// Ordered metadata map
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A loaded unit of text with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A retrieval-sized fragment of a [`Document`]
pub type Chunk = Document;

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insertion
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Provenance of this document, if tagged
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }

    pub fn chunk_index(&self) -> Option<i64> {
        self.metadata.get(CHUNK_INDEX_KEY).and_then(MetadataValue::as_i64)
    }

    /// Length in characters, the unit chunk sizes are measured in
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Stable identifier derived from provenance, position and content
    ///
    /// Re-ingesting identical content from the same source yields the same id.
    pub fn record_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.chunk_index().unwrap_or(-1).to_le_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_values() {
        assert!(MetadataValue::Null.is_blank());
        assert!(MetadataValue::from("").is_blank());
        assert!(!MetadataValue::from("x").is_blank());
        assert!(!MetadataValue::from(0i64).is_blank());
        assert!(!MetadataValue::from(false).is_blank());
    }

    #[test]
    fn test_metadata_serializes_as_plain_json() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc = Document::new("hello")
            .with_metadata(SOURCE_KEY, "a.txt")
            .with_metadata(CHUNK_INDEX_KEY, 3usize)
            .with_metadata(PROCESSED_AT_KEY, ts);

        let json = serde_json::to_value(&doc.metadata).unwrap();
        assert_eq!(json["source"], "a.txt");
        assert_eq!(json["chunk_index"], 3);
        assert_eq!(json["processed_at"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_record_id_is_stable() {
        let a = Document::new("same text")
            .with_metadata(SOURCE_KEY, "a.txt")
            .with_metadata(CHUNK_INDEX_KEY, 0usize);
        let b = a.clone();
        let c = a.clone().with_metadata(CHUNK_INDEX_KEY, 1usize);

        assert_eq!(a.record_id(), b.record_id());
        assert_ne!(a.record_id(), c.record_id());
        assert_eq!(a.record_id().len(), 64);
    }

    #[test]
    fn test_char_len_counts_characters() {
        assert_eq!(Document::new("héllo").char_len(), 5);
    }
}
