use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::MigrateError;
use crate::model::{CommitHash, CommitNode};
use crate::store::memory::InMemoryRepo;

/// A whole schema repository exported into one gzip-compressed JSON file:
/// branch heads plus every commit with its schema blob. Lets a migration run
/// consume a repository without any version-control tooling or transport.
#[derive(Debug, Serialize, Deserialize)]
struct RepoBundle {
    url: String,
    branches: HashMap<String, CommitHash>,
    commits: Vec<CommitNode>,
}

/// Load a repository bundle file into an in-memory repo
pub async fn open_bundle(path: &Path) -> Result<InMemoryRepo, MigrateError> {
    let compressed = tokio::fs::read(path).await.map_err(|e| {
        MigrateError::RepositoryAccess(format!("cannot read bundle '{}': {}", path.display(), e))
    })?;

    let bundle: RepoBundle = {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut json = String::new();
        decoder.read_to_string(&mut json).map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot decompress bundle '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            MigrateError::RepositoryAccess(format!("invalid bundle '{}': {}", path.display(), e))
        })?
    };

    log::debug!(
        "opened bundle '{}': {} commits, {} branches",
        path.display(),
        bundle.commits.len(),
        bundle.branches.len()
    );
    Ok(InMemoryRepo::from_state(
        bundle.url,
        bundle.branches,
        bundle.commits,
    ))
}

/// Export a repository into a bundle file
pub async fn export_bundle(repo: &InMemoryRepo, path: &Path) -> Result<(), MigrateError> {
    use crate::store::traits::RepoAccess;

    let (branches, commits) = repo.export_state();
    let bundle = RepoBundle {
        url: repo.url(),
        branches,
        commits,
    };
    let json = serde_json::to_string(&bundle).map_err(|e| {
        MigrateError::RepositoryAccess(format!("cannot serialize bundle: {}", e))
    })?;

    let compressed = {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        // writing to a Vec cannot fail
        encoder.write_all(json.as_bytes()).unwrap();
        encoder.finish().unwrap()
    };

    tokio::fs::write(path, compressed).await.map_err(|e| {
        MigrateError::RepositoryAccess(format!(
            "cannot write bundle '{}': {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrType, AttributeDef, ModelDef, SchemaSnapshot};
    use crate::store::traits::RepoAccess;

    #[tokio::test]
    async fn test_bundle_round_trip() {
        let repo = InMemoryRepo::new("mem://bundled");
        let schema = SchemaSnapshot::new(vec![ModelDef::new(
            "Test",
            vec![AttributeDef::new("size", AttrType::Float)],
        )]);
        let first = repo.commit_schema("main", &schema, "first").unwrap();
        let head = repo.commit_schema("main", &schema, "second").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.bundle");
        export_bundle(&repo, &path).await.unwrap();

        let reopened = open_bundle(&path).await.unwrap();
        assert_eq!(reopened.url(), "mem://bundled");
        assert_eq!(reopened.resolve("main").await.unwrap(), head);
        assert!(reopened.is_ancestor(&first, &head).await.unwrap());
        assert!(reopened.read_schema_at(&head).await.unwrap().has_model("Test"));
    }

    #[tokio::test]
    async fn test_open_missing_bundle_fails() {
        let err = open_bundle(Path::new("/nonexistent.bundle")).await.unwrap_err();
        assert!(matches!(err, MigrateError::RepositoryAccess(_)));
    }
}
