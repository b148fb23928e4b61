//! Transient URLs: short-lived references to in-memory blobs.
//!
//! A [`TransientUrl`] is created for a blob, resolved while it is live, and must
//! be revoked explicitly. The registry is owned by the conversion session; no
//! other component creates or revokes URLs.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

const URL_PREFIX: &str = "blob:mp4forge/";

/// An opaque reference to a live blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransientUrl(String);

impl TransientUrl {
    fn new(id: &str) -> Self {
        Self(format!("{}{}", URL_PREFIX, id))
    }

    /// The full URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier part, usable as a path segment.
    pub fn id(&self) -> &str {
        self.0.strip_prefix(URL_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for TransientUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A blob held behind a transient URL.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub data: Bytes,
    pub mime_type: String,
}

/// Registry of live transient URLs.
#[derive(Debug, Default)]
pub struct TransientUrls {
    entries: HashMap<String, BlobEntry>,
}

impl TransientUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a URL for `data`. The buffer is shared, not copied.
    pub fn create(&mut self, data: Bytes, mime_type: impl Into<String>) -> TransientUrl {
        let id = Uuid::new_v4().to_string();
        let url = TransientUrl::new(&id);
        self.entries.insert(
            id,
            BlobEntry {
                data,
                mime_type: mime_type.into(),
            },
        );
        debug!("Created transient URL {}", url);
        url
    }

    /// Looks up a live URL.
    pub fn resolve(&self, url: &TransientUrl) -> Option<&BlobEntry> {
        self.entries.get(url.id())
    }

    /// Looks up a live URL by its identifier.
    pub fn resolve_id(&self, id: &str) -> Option<&BlobEntry> {
        self.entries.get(id)
    }

    /// Releases a URL. Returns false if it was not live.
    pub fn revoke(&mut self, url: &TransientUrl) -> bool {
        let removed = self.entries.remove(url.id()).is_some();
        if removed {
            debug!("Revoked transient URL {}", url);
        }
        removed
    }

    /// Releases every live URL, returning how many there were.
    pub fn revoke_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of live URLs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
