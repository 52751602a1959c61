//! Submitted audio payload

use bytes::Bytes;
use melody_common::{Error, Result};
use mime_guess::Mime;

/// Opaque reference to one uploaded audio file
///
/// Immutable once created. Cloning shares the underlying buffer, so every
/// adapter can hold the payload for the duration of its submission call.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    filename: String,
    content: Bytes,
}

impl DetectionRequest {
    /// Build a request from an uploaded file
    ///
    /// Any directory components in `filename` are dropped; an empty payload is
    /// rejected.
    pub fn new(filename: impl AsRef<str>, content: impl Into<Bytes>) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
        }

        Ok(Self {
            filename: base_name(filename.as_ref()),
            content,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// MIME type guessed from the file extension
    pub fn content_type(&self) -> Mime {
        mime_guess::from_path(&self.filename).first_or_octet_stream()
    }
}

fn base_name(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}
