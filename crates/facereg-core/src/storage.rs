//! Persisted face images: one `<label>.jpg` per enrolled identity.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{RegistryError, RegistryResult};

/// Extensions accepted as pictures, compared case-insensitively.
pub const PICTURE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Extension every saved image gets, whatever format was uploaded.
pub const STORED_EXTENSION: &str = "jpg";

/// Whether `filename` ends in one of [`PICTURE_EXTENSIONS`].
pub fn is_picture(filename: impl AsRef<Path>) -> bool {
    filename
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PICTURE_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)))
        .unwrap_or(false)
}

/// Identity label of a stored image: its file name without directory or extension.
pub fn label_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Reject labels that are empty or would escape the image directory.
pub fn validate_label(label: &str) -> RegistryResult<()> {
    if label.is_empty() {
        return Err(RegistryError::MissingIdentifier);
    }
    let unsafe_name = label == "."
        || label == ".."
        || label.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(RegistryError::InvalidIdentifier(label.to_string()));
    }
    Ok(())
}

/// The directory backing the registry.
#[derive(Debug, Clone)]
pub struct ImageDir {
    root: PathBuf,
}

impl ImageDir {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RegistryError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Open a directory that must already exist, for read-only tooling.
    pub fn open_existing(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| RegistryError::io(&root, e))?;
        if !meta.is_dir() {
            let err = io::Error::new(io::ErrorKind::InvalidInput, "not a directory");
            return Err(RegistryError::io(&root, err));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.root.join(format!("{label}.{STORED_EXTENSION}"))
    }

    /// Write the image for `label`, replacing any previous one.
    ///
    /// The bytes land in a temp file in the same directory first, so a reader
    /// never sees a partially written image.
    pub fn save(&self, label: &str, bytes: &[u8]) -> RegistryResult<PathBuf> {
        validate_label(label)?;
        let path = self.path_for(label);

        let mut tmp =
            NamedTempFile::new_in(&self.root).map_err(|e| RegistryError::io(&self.root, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| RegistryError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| RegistryError::io(&path, e.error))?;

        tracing::debug!(label, path = %path.display(), bytes = bytes.len(), "image saved");
        Ok(path)
    }

    /// Delete the image for `label`. A missing file is an error.
    pub fn remove(&self, label: &str) -> RegistryResult<()> {
        validate_label(label)?;
        let path = self.path_for(label);
        fs::remove_file(&path).map_err(|e| RegistryError::io(&path, e))?;
        tracing::debug!(label, path = %path.display(), "image removed");
        Ok(())
    }

    /// Regular files in the directory with a picture extension, sorted by path.
    pub fn picture_files(&self) -> RegistryResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|e| RegistryError::io(&self.root, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::io(&self.root, e))?;
            let path = entry.path();
            if path.is_file() && is_picture(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
