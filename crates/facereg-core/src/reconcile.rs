//! Startup reconciliation: rebuild the registry from the persisted images.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::error::{RegistryError, RegistryResult};
use crate::provider::EmbeddingProvider;
use crate::registry::RegistryStore;
use crate::storage::{label_from_path, ImageDir};
use crate::types::Embedding;

/// What to do with a stored image that does not yield exactly one face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Fail the whole pass on the first bad image.
    #[default]
    Abort,
    /// Leave the image out of the registry, log it and carry on.
    SkipInvalid,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub enrolled: Vec<String>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// The single embedding an enrollment image must contain.
pub fn single_face(mut faces: Vec<Embedding>) -> RegistryResult<Embedding> {
    match faces.len() {
        0 => Err(RegistryError::NoFaceDetected),
        1 => Ok(faces.remove(0)),
        count => Err(RegistryError::MultipleFaces { count }),
    }
}

/// Compute an embedding for every stored image and swap them into `store` at once.
///
/// Nothing is written to `store` unless the whole pass succeeds. When several
/// files share a label, `<label>.jpg` wins, otherwise the first in path order;
/// the rest are reported as skipped under either policy.
pub fn reconcile(
    images: &ImageDir,
    provider: &dyn EmbeddingProvider,
    store: &RegistryStore,
    policy: ReconcilePolicy,
) -> RegistryResult<ReconcileReport> {
    let files = images.picture_files()?;
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut report = ReconcileReport::default();

    for path in &files {
        let Some(label) = label_from_path(path) else {
            continue;
        };

        let canonical = images.path_for(&label);
        let shadowed = *path != canonical && files.contains(&canonical);
        if shadowed || !seen.insert(label.clone()) {
            tracing::warn!(
                label = %label,
                path = %path.display(),
                "another image already provides this label, skipping"
            );
            report
                .skipped
                .push((path.clone(), format!("duplicate image for label '{label}'")));
            continue;
        }

        let embedding = fs::read(path)
            .map_err(|e| RegistryError::io(path, e))
            .and_then(|bytes| provider.embed(&bytes).map_err(RegistryError::from))
            .and_then(single_face);

        match (embedding, policy) {
            (Ok(embedding), _) => {
                tracing::debug!(label = %label, path = %path.display(), "stored face loaded");
                report.enrolled.push(label.clone());
                entries.push((label, embedding));
            }
            (Err(err), ReconcilePolicy::SkipInvalid) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping stored image");
                report.skipped.push((path.clone(), err.to_string()));
            }
            (Err(err), ReconcilePolicy::Abort) => {
                tracing::error!(path = %path.display(), error = %err, "reconciliation aborted");
                return Err(err);
            }
        }
    }

    store.rebuild(entries);
    tracing::info!(
        dir = %images.root().display(),
        enrolled = report.enrolled.len(),
        skipped = report.skipped.len(),
        "registry rebuilt from disk"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use tempfile::TempDir;

    fn provider() -> ScriptedProvider {
        ScriptedProvider::new(0.5)
            .with(b"alice-img", &[&[1.0, 0.0]])
            .with(b"bob-img", &[&[0.0, 1.0]])
            .with(b"empty-img", &[])
            .with(b"group-img", &[&[1.0, 0.0], &[0.0, 1.0]])
    }

    fn dir_with(files: &[(&str, &str)]) -> (TempDir, ImageDir) {
        let tmp = TempDir::new().unwrap();
        for (name, bytes) in files {
            fs::write(tmp.path().join(name), bytes).unwrap();
        }
        let dir = ImageDir::open(tmp.path()).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_single_face() {
        let one = vec![Embedding::new(vec![1.0])];
        assert!(single_face(one).is_ok());
        assert!(matches!(single_face(vec![]), Err(RegistryError::NoFaceDetected)));
        let two = vec![Embedding::new(vec![1.0]), Embedding::new(vec![2.0])];
        assert!(matches!(single_face(two), Err(RegistryError::MultipleFaces { count: 2 })));
    }

    #[test]
    fn test_rebuild_from_pictures_only() {
        let (_tmp, dir) = dir_with(&[
            ("alice.jpg", "alice-img"),
            ("bob.PNG", "bob-img"),
            ("readme.txt", "not an image"),
        ]);
        let store = RegistryStore::new();
        store.enroll("stale", Embedding::new(vec![0.5, 0.5]));

        let report = reconcile(&dir, &provider(), &store, ReconcilePolicy::Abort).unwrap();

        assert_eq!(report.enrolled, vec!["alice", "bob"]);
        assert!(report.skipped.is_empty());
        assert_eq!(store.list_labels(), vec!["alice", "bob"]);
        assert_eq!(store.snapshot()["bob"].values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_abort_on_no_face_leaves_store_untouched() {
        let (_tmp, dir) = dir_with(&[("alice.jpg", "alice-img"), ("ghost.jpg", "empty-img")]);
        let store = RegistryStore::new();
        store.enroll("previous", Embedding::new(vec![0.5, 0.5]));

        let err = reconcile(&dir, &provider(), &store, ReconcilePolicy::Abort).unwrap_err();

        assert!(matches!(err, RegistryError::NoFaceDetected));
        assert_eq!(store.list_labels(), vec!["previous"]);
    }

    #[test]
    fn test_abort_on_multiple_faces() {
        let (_tmp, dir) = dir_with(&[("group.gif", "group-img")]);
        let store = RegistryStore::new();
        let err = reconcile(&dir, &provider(), &store, ReconcilePolicy::Abort).unwrap_err();
        assert!(matches!(err, RegistryError::MultipleFaces { count: 2 }));
    }

    #[test]
    fn test_skip_invalid_keeps_good_images() {
        let (_tmp, dir) = dir_with(&[
            ("alice.jpg", "alice-img"),
            ("ghost.jpg", "empty-img"),
            ("group.jpeg", "group-img"),
        ]);
        let store = RegistryStore::new();

        let report = reconcile(&dir, &provider(), &store, ReconcilePolicy::SkipInvalid).unwrap();

        assert_eq!(report.enrolled, vec!["alice"]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(store.list_labels(), vec!["alice"]);
    }

    #[test]
    fn test_empty_directory_yields_empty_registry() {
        let (_tmp, dir) = dir_with(&[]);
        let store = RegistryStore::new();
        store.enroll("stale", Embedding::new(vec![1.0]));
        reconcile(&dir, &provider(), &store, ReconcilePolicy::Abort).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_stems_keep_the_stored_jpg() {
        let (tmp, dir) = dir_with(&[("alice.PNG", "bob-img"), ("alice.jpg", "alice-img")]);
        let store = RegistryStore::new();

        for policy in [ReconcilePolicy::Abort, ReconcilePolicy::SkipInvalid] {
            let report = reconcile(&dir, &provider(), &store, policy).unwrap();

            assert_eq!(report.enrolled, vec!["alice"]);
            assert_eq!(report.skipped.len(), 1);
            assert_eq!(report.skipped[0].0, tmp.path().join("alice.PNG"));
            assert_eq!(store.list_labels(), vec!["alice"]);
            assert_eq!(store.snapshot()["alice"].values, vec![1.0, 0.0]);
        }
    }

    #[test]
    fn test_duplicate_stems_without_jpg_keep_the_first() {
        let (tmp, dir) = dir_with(&[("bob.png", "bob-img"), ("bob.gif", "alice-img")]);
        let store = RegistryStore::new();

        let report = reconcile(&dir, &provider(), &store, ReconcilePolicy::Abort).unwrap();

        assert_eq!(report.enrolled, vec!["bob"]);
        assert_eq!(report.skipped[0].0, tmp.path().join("bob.png"));
        assert_eq!(store.snapshot()["bob"].values, vec![1.0, 0.0]);
    }
}
