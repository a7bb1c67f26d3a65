use thiserror::Error;

use crate::logic::sentinel::ViolationReport;
use crate::model::{hash_prefix, CommitHash};

/// Failure taxonomy of the migration engine.
///
/// Systemic errors (`SentinelPlacement`, `AmbiguousOrder`) describe a defective
/// descriptor configuration upstream of any data; they abort a whole batch
/// before any file is written. The remaining variants are fatal only to the
/// affected file.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Commit or content unresolvable, or backend I/O failed
    #[error("repository access failed: {0}")]
    RepositoryAccess(String),

    /// The sentinel commits do not partition the commit graph into
    /// unambiguous domains
    #[error("sentinel placement violated:\n{0}")]
    SentinelPlacement(ViolationReport),

    /// Two applicable sentinels are mutually incomparable in the commit DAG
    #[error("ambiguous sentinel order: {}", format_pairs(pairs))]
    AmbiguousOrder {
        pairs: Vec<(CommitHash, CommitHash)>,
    },

    /// A structural schema change not covered by declared renames or a
    /// custom transformation
    #[error("unresolved structural change: {0}")]
    RenameAmbiguity(String),

    /// A custom transformation hook failed or could not be resolved
    #[error("transformation failed: {0}")]
    Transformation(String),

    /// Dataset file unreadable, unwritable, or inconsistent with its schema
    #[error("dataset error: {0}")]
    Dataset(String),
}

impl MigrateError {
    /// Systemic errors abort the entire batch before any writes occur;
    /// everything else aborts only the affected file.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            MigrateError::SentinelPlacement(_) | MigrateError::AmbiguousOrder { .. }
        )
    }
}

fn format_pairs(pairs: &[(CommitHash, CommitHash)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("({}, {})", hash_prefix(a), hash_prefix(b)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemic_split() {
        let ambiguous = MigrateError::AmbiguousOrder {
            pairs: vec![("a".repeat(64), "b".repeat(64))],
        };
        assert!(ambiguous.is_systemic());
        assert!(!MigrateError::RenameAmbiguity("x".into()).is_systemic());
        assert!(!MigrateError::Transformation("x".into()).is_systemic());
        assert!(!MigrateError::RepositoryAccess("x".into()).is_systemic());
    }

    #[test]
    fn test_ambiguous_order_names_pairs() {
        let err = MigrateError::AmbiguousOrder {
            pairs: vec![("aaaaaaaa".repeat(8), "bbbbbbbb".repeat(8))],
        };
        let message = err.to_string();
        assert!(message.contains("aaaaaaa"));
        assert!(message.contains("bbbbbbb"));
    }
}
