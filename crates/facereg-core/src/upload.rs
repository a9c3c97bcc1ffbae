//! Uploaded images, whichever way they arrived.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::{RegistryError, RegistryResult};
use crate::storage::is_picture;

/// An image handed in by a caller, with the file name it was uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into() }
    }

    /// Decode a base64 image and name it after its sniffed format.
    ///
    /// Query strings turn `+` into a space, so spaces are read back as `+`;
    /// line breaks are ignored. Both the standard and URL-safe alphabets are
    /// accepted, padded or not.
    pub fn from_base64(encoded: &str) -> RegistryResult<Self> {
        let cleaned: String = encoded
            .chars()
            .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();
        if cleaned.is_empty() {
            return Err(RegistryError::InvalidFile);
        }

        let bytes = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(&cleaned).ok())
            .ok_or(RegistryError::InvalidFile)?;

        let format = image::guess_format(&bytes).map_err(|_| RegistryError::InvalidFile)?;
        let ext = format
            .extensions_str()
            .first()
            .ok_or(RegistryError::InvalidFile)?;

        Ok(Self::new(format!("upload.{ext}"), bytes))
    }

    /// A usable upload has a picture file name and some content.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.filename.is_empty() || self.bytes.is_empty() || !is_picture(&self.filename) {
            return Err(RegistryError::InvalidFile);
        }
        Ok(())
    }
}
