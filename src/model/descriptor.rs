use serde::{Deserialize, Serialize};

use crate::model::{is_commit_hash, CommitHash};

/// Rename of one model: (old name, new name)
pub type ModelRename = (String, String);

/// Rename of one attribute: ((old model, old attribute), (new model, new attribute))
pub type AttrRename = ((String, String), (String, String));

/// Documents the cumulative schema change of one domain of commits,
/// anchored at a sentinel commit.
///
/// Immutable once stored; amendments are new descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    /// Hash of the sentinel commit this descriptor documents
    pub commit_hash: CommitHash,
    /// Manual model rename annotations, applied as one simultaneous permutation
    #[serde(default)]
    pub renamed_models: Vec<ModelRename>,
    /// Manual attribute rename annotations, per model pair
    #[serde(default)]
    pub renamed_attributes: Vec<AttrRename>,
    /// Registry key of the custom transformation for this change, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformations_file: Option<String>,
}

impl ChangeDescriptor {
    pub fn new(commit_hash: impl Into<CommitHash>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            renamed_models: Vec::new(),
            renamed_attributes: Vec::new(),
            transformations_file: None,
        }
    }

    /// An empty descriptor bound to a sentinel, ready for authors to fill in
    pub fn template(commit_hash: impl Into<CommitHash>) -> Self {
        Self::new(commit_hash)
    }

    /// Check the descriptor's record-level constraints; returns all problems found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !is_commit_hash(&self.commit_hash) {
            errors.push(format!(
                "commit_hash is '{}', which isn't the right length for a commit hash",
                self.commit_hash
            ));
        }

        for (old_name, new_name) in &self.renamed_models {
            if old_name.is_empty() || new_name.is_empty() {
                errors.push(format!(
                    "renamed_models entry ('{}', '{}') contains an empty name",
                    old_name, new_name
                ));
            }
        }

        for ((old_model, old_attr), (new_model, new_attr)) in &self.renamed_attributes {
            if old_model.is_empty() || old_attr.is_empty() || new_model.is_empty() || new_attr.is_empty()
            {
                errors.push(format!(
                    "renamed_attributes entry (('{}', '{}'), ('{}', '{}')) contains an empty name",
                    old_model, old_attr, new_model, new_attr
                ));
            }
        }

        errors
    }
}
