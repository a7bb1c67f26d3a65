use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::MigrateError;
use crate::model::{CommitHash, SchemaSnapshot};
use crate::store::traits::RepoAccess;

/// Read-only, immutable schema snapshot cache keyed by commit hash.
///
/// Safe for concurrent population with memoize-once semantics: concurrent
/// misses for the same commit converge on a single `read_schema_at` call
/// through a per-entry `OnceCell`.
#[derive(Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<CommitHash, Arc<OnceCell<Arc<SchemaSnapshot>>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the snapshot at a commit, loading it at most once per commit
    pub async fn get_or_load<R: RepoAccess + ?Sized>(
        &self,
        repo: &R,
        commit: &CommitHash,
    ) -> Result<Arc<SchemaSnapshot>, MigrateError> {
        let cell = {
            let mut entries = self.entries.write();
            entries
                .entry(commit.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let snapshot = cell
            .get_or_try_init(|| async {
                log::debug!("loading schema snapshot at {}", commit);
                repo.read_schema_at(commit).await.map(Arc::new)
            })
            .await?;
        Ok(snapshot.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
