use std::path::Path;

use crate::error::MigrateError;
use crate::model::{ChangeDescriptor, CommitHash, DatasetGraph, SchemaSnapshot};

/// Read access to a schema repository's commit graph, independent of any
/// specific version-control tool.
///
/// Implementations must memoize ancestry queries: repeated `is_ancestor` calls
/// for the same pair must not re-traverse the DAG. Calls may block on I/O and
/// are individually cancelable (they are plain futures); callers impose any
/// timeout bounds.
#[async_trait::async_trait]
pub trait RepoAccess: Send + Sync {
    /// Where this repository lives, for provenance records
    fn url(&self) -> String;

    /// Resolve a reference (branch name, full hash, or unique hash prefix)
    /// to a commit hash
    async fn resolve(&self, reference: &str) -> Result<CommitHash, MigrateError>;

    /// Parent commits of a commit
    async fn parents(&self, commit: &CommitHash) -> Result<Vec<CommitHash>, MigrateError>;

    /// Whether `ancestor` is an ancestor of `descendant`. Reflexive: a commit
    /// is considered an ancestor of itself.
    async fn is_ancestor(
        &self,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> Result<bool, MigrateError>;

    /// The schema definition as it existed at a commit
    async fn read_schema_at(&self, commit: &CommitHash) -> Result<SchemaSnapshot, MigrateError>;
}

/// Loads and persists schema change descriptors
#[async_trait::async_trait]
pub trait DescriptorStore: Send + Sync {
    /// All validated descriptors known to the store
    async fn load_all(&self) -> Result<Vec<ChangeDescriptor>, MigrateError>;

    /// Persist a descriptor; returns its storage key. Descriptors are
    /// immutable: saving over an existing one is an error.
    async fn save(&self, descriptor: &ChangeDescriptor) -> Result<String, MigrateError>;
}

/// Reads and writes dataset files as typed instance graphs.
///
/// Writes must be atomic: a failed or canceled write never leaves a partially
/// written file observable at `path`.
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    async fn read(&self, path: &Path) -> Result<DatasetGraph, MigrateError>;
    async fn write(&self, path: &Path, graph: &DatasetGraph) -> Result<(), MigrateError>;
}
