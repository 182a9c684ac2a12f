//! Precomputed attribute document.
//!
//! Produced offline and served verbatim by `/metadata`. The server only reads
//! the `attribute` and `type` of each entry; every other field passes through.

use crate::error::{QueryError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct Entry {
    attribute: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Shape {
    #[serde(default)]
    attributes: Vec<Entry>,
}

/// The attribute document plus an index of its attribute names.
#[derive(Debug, Clone)]
pub struct AttributeDocument {
    raw: Value,
    entries: Vec<Entry>,
}

impl AttributeDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            QueryError::config(format!(
                "failed to read attribute document {}: {e}",
                path.display()
            ))
        })?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            QueryError::config(format!(
                "attribute document {} is not valid JSON: {e}",
                path.display()
            ))
        })?;
        let doc = Self::from_value(raw)?;
        tracing::info!(path = %path.display(), attributes = doc.len(), "loaded attribute document");
        Ok(doc)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        let shape: Shape = serde_json::from_value(raw.clone())
            .map_err(|e| QueryError::config(format!("malformed attribute document: {e}")))?;
        Ok(Self {
            raw,
            entries: shape.attributes,
        })
    }

    /// The document as loaded.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.entries.iter().any(|e| e.attribute == attribute)
    }

    /// Declared type of `attribute` (`number`, `string`, `boolean`, ...).
    pub fn kind(&self, attribute: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.attribute == attribute)
            .and_then(|e| e.kind.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
