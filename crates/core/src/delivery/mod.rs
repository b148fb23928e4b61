//! Output delivery: handing the converted artifact to the user.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::session::OutputArtifact;
use crate::transient::TransientUrls;

/// A one-shot download of the converted artifact.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// File name offered for an artifact delivered at `at`.
pub fn download_file_name(at: DateTime<Utc>) -> String {
    format!("converted-{}.mp4", at.timestamp_millis())
}

/// Creates a transient URL for `artifact`, hands the blob over as a
/// [`Download`], and revokes the URL before returning.
pub fn deliver(urls: &mut TransientUrls, artifact: &OutputArtifact, at: DateTime<Utc>) -> Download {
    let url = urls.create(artifact.data().clone(), artifact.mime_type());

    let download = match urls.resolve(&url) {
        Some(entry) => Download {
            file_name: download_file_name(at),
            mime_type: entry.mime_type.clone(),
            data: entry.data.clone(),
        },
        None => Download {
            file_name: download_file_name(at),
            mime_type: artifact.mime_type().to_string(),
            data: artifact.data().clone(),
        },
    };

    urls.revoke(&url);
    debug!(
        "Delivered {} ({} bytes)",
        download.file_name,
        download.data.len()
    );
    download
}
