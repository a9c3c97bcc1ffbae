//! Enrollment, revocation and recognition over one registry.

use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult};
use crate::matcher;
use crate::provider::EmbeddingProvider;
use crate::reconcile::{self, single_face, ReconcilePolicy, ReconcileReport};
use crate::registry::RegistryStore;
use crate::storage::{validate_label, ImageDir};
use crate::types::Recognition;
use crate::upload::ImageUpload;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollOptions {
    /// Delete the freshly saved image when no single face could be extracted.
    ///
    /// Off by default: the image stays on disk without a registry entry, and
    /// the next reconciliation will trip over it.
    pub rollback_on_failure: bool,
}

/// The registry service: store, backing images and embedding provider together.
///
/// Two enrolls of the same label racing each other may leave the image of one
/// and the embedding of the other.
pub struct FaceRegistry {
    store: Arc<RegistryStore>,
    images: ImageDir,
    provider: Arc<dyn EmbeddingProvider>,
    options: EnrollOptions,
}

impl FaceRegistry {
    pub fn new(
        store: Arc<RegistryStore>,
        images: ImageDir,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            images,
            provider,
            options: EnrollOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EnrollOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn images(&self) -> &ImageDir {
        &self.images
    }

    /// Rebuild the store from the image directory.
    pub fn reconcile(&self, policy: ReconcilePolicy) -> RegistryResult<ReconcileReport> {
        reconcile::reconcile(&self.images, self.provider.as_ref(), &self.store, policy)
    }

    pub fn list(&self) -> Vec<String> {
        self.store.list_labels()
    }

    /// Save the image as `<label>.jpg`, extract its single face and enroll it.
    ///
    /// The image is written before the face check, so a failed enroll leaves it
    /// on disk unless `rollback_on_failure` is set.
    pub fn enroll(&self, label: Option<&str>, upload: &ImageUpload) -> RegistryResult<Vec<String>> {
        let label = required_label(label)?;
        upload.validate()?;

        tracing::info!(
            label,
            filename = %upload.filename,
            bytes = upload.bytes.len(),
            "enroll requested"
        );
        self.images.save(label, &upload.bytes)?;

        let embedding = match self
            .provider
            .embed(&upload.bytes)
            .map_err(RegistryError::from)
            .and_then(single_face)
        {
            Ok(embedding) => embedding,
            Err(err) => {
                self.after_failed_enroll(label, &err);
                return Err(err);
            }
        };

        self.store.enroll(label, embedding);
        tracing::info!(label, enrolled = self.store.len(), "face enrolled");
        Ok(self.list())
    }

    fn after_failed_enroll(&self, label: &str, err: &RegistryError) {
        if !self.options.rollback_on_failure {
            tracing::warn!(
                label,
                error = %err,
                path = %self.images.path_for(label).display(),
                "enroll failed; saved image left without a registry entry"
            );
            return;
        }
        match self.images.remove(label) {
            Ok(()) => {
                tracing::info!(label, error = %err, "enroll failed; saved image rolled back")
            }
            Err(cleanup) => {
                tracing::warn!(label, error = %err, cleanup = %cleanup, "enroll rollback failed")
            }
        }
    }

    /// Remove `label` from the store, then delete its image.
    ///
    /// If the image cannot be deleted the error is returned, but the label stays revoked.
    pub fn revoke(&self, label: Option<&str>) -> RegistryResult<Vec<String>> {
        let label = required_label(label)?;

        self.store.revoke(label)?;
        tracing::info!(label, enrolled = self.store.len(), "face revoked");

        if let Err(err) = self.images.remove(label) {
            tracing::warn!(label, error = %err, "revoked face had no removable image");
            return Err(err);
        }
        Ok(self.list())
    }

    /// Match every face in the upload against one consistent snapshot.
    pub fn recognize(&self, upload: &ImageUpload) -> RegistryResult<Recognition> {
        upload.validate()?;
        let probes = self.provider.embed(&upload.bytes)?;
        let gallery = self.store.snapshot();
        Ok(matcher::recognize_faces(self.provider.as_ref(), &probes, &gallery))
    }
}

fn required_label(label: Option<&str>) -> RegistryResult<&str> {
    let label = label.filter(|l| !l.is_empty()).ok_or(RegistryError::MissingIdentifier)?;
    validate_label(label)?;
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> FaceRegistry {
        let provider = ScriptedProvider::new(0.8)
            .with(b"alice-1", &[&[1.0, 0.0, 0.0]])
            .with(b"alice-2", &[&[0.98, 0.1, 0.0]])
            .with(b"bob-1", &[&[0.0, 1.0, 0.0]])
            .with(b"nobody", &[])
            .with(b"pair", &[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]]);
        FaceRegistry::new(
            Arc::new(RegistryStore::new()),
            ImageDir::open(tmp.path()).unwrap(),
            Arc::new(provider),
        )
    }

    fn upload(bytes: &[u8]) -> ImageUpload {
        ImageUpload::new("photo.png", bytes.to_vec())
    }

    #[test]
    fn test_enroll_saves_jpg_and_lists() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        let labels = reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();

        assert_eq!(labels, vec!["alice"]);
        assert_eq!(std::fs::read(tmp.path().join("alice.jpg")).unwrap(), b"alice-1");
    }

    #[test]
    fn test_enroll_requires_label() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        for label in [None, Some("")] {
            assert!(matches!(
                reg.enroll(label, &upload(b"alice-1")),
                Err(RegistryError::MissingIdentifier)
            ));
        }
        assert!(matches!(
            reg.enroll(Some("../x"), &upload(b"alice-1")),
            Err(RegistryError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_enroll_rejects_non_picture() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let doc = ImageUpload::new("cv.pdf", b"alice-1".to_vec());
        assert!(matches!(reg.enroll(Some("alice"), &doc), Err(RegistryError::InvalidFile)));
        assert!(!tmp.path().join("alice.jpg").exists());
    }

    #[test]
    fn test_enroll_two_faces_leaves_file_but_no_entry() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        let err = reg.enroll(Some("group"), &upload(b"pair")).unwrap_err();

        assert!(matches!(err, RegistryError::MultipleFaces { count: 2 }));
        assert!(reg.list().is_empty());
        assert!(tmp.path().join("group.jpg").exists(), "image is saved before the face check");
    }

    #[test]
    fn test_enroll_no_face_with_rollback_removes_file() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp).with_options(EnrollOptions { rollback_on_failure: true });

        let err = reg.enroll(Some("ghost"), &upload(b"nobody")).unwrap_err();

        assert!(matches!(err, RegistryError::NoFaceDetected));
        assert!(!tmp.path().join("ghost.jpg").exists());
        assert!(reg.list().is_empty());
    }

    #[test]
    fn test_failed_reenroll_keeps_previous_embedding() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();

        assert!(reg.enroll(Some("alice"), &upload(b"pair")).is_err());

        assert_eq!(reg.store().snapshot()["alice"].values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reenroll_replaces_embedding_for_matching() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();
        reg.enroll(Some("alice"), &upload(b"bob-1")).unwrap();

        let result = reg.recognize(&upload(b"alice-1")).unwrap();
        assert_eq!(result.count, 1);
        assert!(result.faces.is_empty());
        assert_eq!(reg.list(), vec!["alice"]);
    }

    #[test]
    fn test_revoke() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();
        reg.enroll(Some("bob"), &upload(b"bob-1")).unwrap();

        assert_eq!(reg.revoke(Some("alice")).unwrap(), vec!["bob"]);
        assert!(!tmp.path().join("alice.jpg").exists());
        assert!(matches!(reg.revoke(Some("alice")), Err(RegistryError::NotFound(_))));
        assert!(matches!(reg.revoke(None), Err(RegistryError::MissingIdentifier)));
    }

    #[test]
    fn test_revoke_with_missing_file_still_revokes() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();
        std::fs::remove_file(tmp.path().join("alice.jpg")).unwrap();

        assert!(matches!(reg.revoke(Some("alice")), Err(RegistryError::Io { .. })));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn test_recognize() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.enroll(Some("alice"), &upload(b"alice-1")).unwrap();
        reg.enroll(Some("bob"), &upload(b"bob-1")).unwrap();

        let same = reg.recognize(&upload(b"alice-2")).unwrap();
        assert_eq!(same.count, 1);
        assert_eq!(same.faces.len(), 1);
        assert_eq!(same.faces[0].id, "alice");
        assert!(same.faces[0].dist < 0.2, "dist = {}", same.faces[0].dist);

        let none = reg.recognize(&upload(b"nobody")).unwrap();
        assert_eq!(none, Recognition { count: 0, faces: vec![] });

        let both = reg.recognize(&upload(b"pair")).unwrap();
        assert_eq!(both.count, 2);
        let ids: Vec<&str> = both.faces.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[test]
    fn test_reconcile_restores_enrolled_faces() {
        let tmp = TempDir::new().unwrap();
        registry(&tmp).enroll(Some("alice"), &upload(b"alice-1")).unwrap();

        let fresh = registry(&tmp);
        assert!(fresh.list().is_empty());
        fresh.reconcile(ReconcilePolicy::Abort).unwrap();
        assert_eq!(fresh.list(), vec!["alice"]);
    }
}
