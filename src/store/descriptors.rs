use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::MigrateError;
use crate::model::{hash_prefix, ChangeDescriptor};
use crate::store::traits::DescriptorStore;

const FILENAME_PREFIX: &str = "schema-changes";
const FILENAME_EXT: &str = "json";

/// Descriptor store backed by a migrations directory: one JSON file per
/// sentinel commit, named `schema-changes_<timestamp>_<hash prefix>.json`.
pub struct FsDescriptorStore {
    dir: PathBuf,
}

impl FsDescriptorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn generate_filename(descriptor: &ChangeDescriptor) -> String {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H-%M-%S");
        format!(
            "{}_{}_{}.{}",
            FILENAME_PREFIX,
            timestamp,
            hash_prefix(&descriptor.commit_hash),
            FILENAME_EXT
        )
    }

    /// The hash prefix encoded in a descriptor filename, if it has one
    fn prefix_from_filename(filename: &str) -> Option<&str> {
        let stem = filename.strip_suffix(&format!(".{}", FILENAME_EXT))?;
        if !stem.starts_with(FILENAME_PREFIX) {
            return None;
        }
        stem.rsplit('_').next()
    }

    async fn parse_file(path: &Path) -> Result<ChangeDescriptor, MigrateError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot read schema changes file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let descriptor: ChangeDescriptor = serde_json::from_str(&content).map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "invalid schema changes file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let errors = descriptor.validate();
        if !errors.is_empty() {
            return Err(MigrateError::RepositoryAccess(format!(
                "in schema changes file '{}': {}",
                path.display(),
                errors.join("; ")
            )));
        }

        // the filename prefix must agree with the hash inside the file
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if let Some(prefix) = Self::prefix_from_filename(filename) {
            if prefix != hash_prefix(&descriptor.commit_hash) {
                return Err(MigrateError::RepositoryAccess(format!(
                    "hash prefix in schema changes filename '{}' inconsistent with hash in file: '{}'",
                    path.display(),
                    descriptor.commit_hash
                )));
            }
        }

        Ok(descriptor)
    }
}

#[async_trait::async_trait]
impl DescriptorStore for FsDescriptorStore {
    async fn load_all(&self) -> Result<Vec<ChangeDescriptor>, MigrateError> {
        let mut descriptors = Vec::new();
        let mut seen = HashSet::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // a repository without a migrations directory has no descriptors
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(descriptors),
            Err(e) => {
                return Err(MigrateError::RepositoryAccess(format!(
                    "cannot read migrations directory '{}': {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot read migrations directory '{}': {}",
                self.dir.display(),
                e
            ))
        })? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(FILENAME_PREFIX) && name.ends_with(&format!(".{}", FILENAME_EXT)) {
                paths.push(path);
            }
        }
        // deterministic load order regardless of directory iteration order
        paths.sort();

        for path in paths {
            let descriptor = Self::parse_file(&path).await?;
            if !seen.insert(descriptor.commit_hash.clone()) {
                return Err(MigrateError::RepositoryAccess(format!(
                    "multiple schema changes files for commit {}",
                    descriptor.commit_hash
                )));
            }
            descriptors.push(descriptor);
        }

        log::debug!(
            "loaded {} schema change descriptors from '{}'",
            descriptors.len(),
            self.dir.display()
        );
        Ok(descriptors)
    }

    async fn save(&self, descriptor: &ChangeDescriptor) -> Result<String, MigrateError> {
        let errors = descriptor.validate();
        if !errors.is_empty() {
            return Err(MigrateError::RepositoryAccess(format!(
                "descriptor for commit '{}' does not validate: {}",
                descriptor.commit_hash,
                errors.join("; ")
            )));
        }

        // one descriptor per sentinel
        for existing in self.load_all().await? {
            if existing.commit_hash == descriptor.commit_hash {
                return Err(MigrateError::RepositoryAccess(format!(
                    "schema changes file for commit {} already exists",
                    descriptor.commit_hash
                )));
            }
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot create migrations directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let filename = Self::generate_filename(descriptor);
        let path = self.dir.join(&filename);
        let content = serde_json::to_string_pretty(descriptor).map_err(|e| {
            MigrateError::RepositoryAccess(format!("cannot serialize descriptor: {}", e))
        })?;
        tokio::fs::write(&path, content).await.map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot write schema changes file '{}': {}",
                path.display(),
                e
            ))
        })?;

        log::info!("wrote schema changes template '{}'", path.display());
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor(fill: char) -> ChangeDescriptor {
        ChangeDescriptor::template(fill.to_string().repeat(64))
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::new(dir.path().join("migrations"));

        let key = store.save(&sample_descriptor('a')).await.unwrap();
        assert!(key.starts_with("schema-changes_"));
        assert!(key.ends_with(&format!("_{}.json", "a".repeat(7))));
        store.save(&sample_descriptor('b')).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::new(dir.path().join("absent"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sentinel_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::new(dir.path());
        store.save(&sample_descriptor('a')).await.unwrap();
        let err = store.save(&sample_descriptor('a')).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_filename_hash_consistency_checked() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::new(dir.path());

        // file claims prefix 'b' but contains hash of all 'a'
        let path = dir
            .path()
            .join(format!("schema-changes_2020-03-09-12-00-00_{}.json", "b".repeat(7)));
        let content = serde_json::to_string(&sample_descriptor('a')).unwrap();
        tokio::fs::write(&path, content).await.unwrap();

        let err = store.load_all().await.unwrap_err();
        assert!(err.to_string().contains("inconsistent"));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDescriptorStore::new(dir.path());
        let err = store.save(&ChangeDescriptor::new("short")).await.unwrap_err();
        assert!(err.to_string().contains("does not validate"));
    }
}
