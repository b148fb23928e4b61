//! Input acquisition: turning user-selected files into a session input.

use bytes::Bytes;
use serde::Serialize;

use crate::session::SessionError;

/// Formats listed to the user. Advisory only: acceptance is decided by the
/// declared MIME type.
pub const SUPPORTED_FORMATS_HINT: &[&str] = &["MP4", "AVI", "MOV", "MKV", "WEBM", "FLV", "WMV"];

/// A user-selected file: raw bytes plus the metadata the user agent declared.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    mime_type: String,
    data: Bytes,
}

impl InputFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared MIME type. Never sniffed from content.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Size in megabytes, as shown next to the preview.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes() as f64 / 1024.0 / 1024.0
    }

    pub fn summary(&self) -> InputSummary {
        InputSummary {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes(),
        }
    }
}

/// Metadata of the current input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSummary {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Whether a declared MIME type names a video.
pub fn is_video_mime(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

/// Rejects any file whose declared type is not `video/*`.
pub fn validate_input(file: &InputFile) -> Result<(), SessionError> {
    if is_video_mime(file.mime_type()) {
        Ok(())
    } else {
        Err(SessionError::InvalidFile {
            name: file.name().to_string(),
            mime_type: file.mime_type().to_string(),
        })
    }
}

/// Picks the first file of a selection.
///
/// Every file after the first is ignored. An empty selection yields `None`.
/// The pick is not validated here; the session checks it after making sure
/// no conversion is running.
pub fn select_input<I>(files: I) -> Option<InputFile>
where
    I: IntoIterator<Item = InputFile>,
{
    files.into_iter().next()
}
