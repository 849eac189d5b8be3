//! Collection and record addresses

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Address of a collection: `users`, or `conversations/{id}/messages` for a
/// nested one. Always an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// Collection by name.
    ///
    /// A name containing `/` is parsed as a nested path. A name that is not a
    /// valid collection path (`users/u1` names a record) is kept verbatim as
    /// one segment and logged; use [`CollectionPath::parse`] to get the
    /// validation error instead.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        match Self::parse(&name) {
            Ok(path) => path,
            Err(e) => {
                warn!(name = %name, error = %e, "Invalid collection path, using it as a single segment");
                Self { segments: vec![name] }
            }
        }
    }

    /// Parse a slash-separated collection path.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split_segments(path)?;
        if segments.len() % 2 == 0 {
            return Err(ClientError::InvalidPath(format!(
                "collection path '{}' must have an odd number of segments",
                path
            )));
        }
        Ok(Self { segments })
    }

    /// Reference to the record `id` in this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocRef {
        DocRef {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// Last segment, e.g. `messages` for `conversations/c1/messages`.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The record this collection is nested under, if any.
    pub fn parent(&self) -> Option<DocRef> {
        if self.segments.len() < 3 {
            return None;
        }
        let n = self.segments.len();
        Some(DocRef {
            collection: CollectionPath {
                segments: self.segments[..n - 2].to_vec(),
            },
            id: self.segments[n - 2].clone(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_path(&self) -> String {
        self.segments.join("/")
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_path())
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(value: CollectionPath) -> Self {
        value.as_path()
    }
}

/// Address of a single record: a collection path plus the record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocRef {
    collection: CollectionPath,
    id: String,
}

impl DocRef {
    /// Parse `collection/id[/collection/id...]`.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = split_segments(path)?;
        if segments.len() % 2 != 0 {
            return Err(ClientError::InvalidPath(format!(
                "document path '{}' must have an even number of segments",
                path
            )));
        }
        let id = segments.pop().unwrap_or_default();
        Ok(Self {
            collection: CollectionPath { segments },
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    /// Nested collection under this record.
    pub fn collection(&self, name: impl Into<String>) -> CollectionPath {
        let mut segments = self.collection.segments.clone();
        segments.push(self.id.clone());
        segments.push(name.into());
        CollectionPath { segments }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection.as_path(), self.id)
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

fn split_segments(path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidPath("path is empty".into()));
    }
    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ClientError::InvalidPath(format!(
            "path '{}' contains an empty segment",
            path
        )));
    }
    Ok(segments)
}
