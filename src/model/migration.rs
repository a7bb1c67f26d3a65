use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::model::CommitHash;

/// Reusable description of one migration run, authored by data maintainers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Dataset files to migrate
    pub files_to_migrate: Vec<PathBuf>,
    /// Location of the schema repository
    pub schema_repo_url: String,
    /// Branch whose sentinel history governs the migration
    pub branch: String,
    /// Path of the schema definition within the schema repository
    pub schema_file: PathBuf,
}

/// Non-fatal integrity notice: instances or relationships dropped because the
/// schema removed their model or attribute. Recorded, never silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DataIntegrityWarning {
    DroppedInstances { model: String, count: usize },
    SeveredReferences { attribute: String, count: usize },
}

/// Accumulated record of what one file's migration dropped or rewired
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Instances dropped per removed model
    pub dropped_instances: BTreeMap<String, usize>,
    /// Relationship references cleared because their target was dropped
    pub severed_references: usize,
    pub warnings: Vec<DataIntegrityWarning>,
}

impl MigrationSummary {
    pub fn record_dropped(&mut self, model: &str, count: usize) {
        if count == 0 {
            return;
        }
        *self.dropped_instances.entry(model.to_string()).or_insert(0) += count;
        self.warnings.push(DataIntegrityWarning::DroppedInstances {
            model: model.to_string(),
            count,
        });
    }

    pub fn record_severed(&mut self, attribute: &str, count: usize) {
        if count == 0 {
            return;
        }
        self.severed_references += count;
        self.warnings.push(DataIntegrityWarning::SeveredReferences {
            attribute: attribute.to_string(),
            count,
        });
    }

    /// Fold one migration step's summary into the whole-file summary
    pub fn absorb(&mut self, step: MigrationSummary) {
        for (model, count) in step.dropped_instances {
            *self.dropped_instances.entry(model).or_insert(0) += count;
        }
        self.severed_references += step.severed_references;
        self.warnings.extend(step.warnings);
    }
}

/// Outcome of migrating one dataset file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMigrationReport {
    pub file: PathBuf,
    /// Commit the file complied with before migration
    pub from_commit: CommitHash,
    /// Commit the file complies with now
    pub to_commit: CommitHash,
    /// Number of schema change descriptors applied
    pub steps: usize,
    /// Where the migrated file was written
    pub written_to: PathBuf,
    pub summary: MigrationSummary,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// A file that failed to migrate; the original file is left untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Outcome of a batch run over independent files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub migrated: Vec<FileMigrationReport>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    /// A run succeeds only if every requested file migrated
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
