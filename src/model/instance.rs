use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{CommitHash, Id};

/// Schema compliance record embedded in each dataset file: which schema
/// repository, branch, and commit the file's structure currently matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub repo_url: String,
    pub branch: String,
    pub commit_hash: CommitHash,
}

impl Provenance {
    pub fn new(
        repo_url: impl Into<String>,
        branch: impl Into<String>,
        commit_hash: impl Into<CommitHash>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
            commit_hash: commit_hash.into(),
        }
    }
}

/// One typed instance in a dataset.
///
/// Scalar attribute values and key-based relationship references are kept in
/// separate maps; references hold instance ids only, never live pointers, so
/// structural migration reduces to map edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: Id,
    /// Name of the model this instance conforms to
    pub model: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Vec<Id>>,
}

impl Instance {
    pub fn new(id: impl Into<Id>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>, targets: Vec<Id>) -> Self {
        self.references.insert(name.into(), targets);
        self
    }
}

/// The in-memory representation of one dataset file: an arena of instances
/// keyed by stable identity, plus the provenance metadata they comply with.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetGraph {
    pub provenance: Provenance,
    pub instances: BTreeMap<Id, Instance>,
}

impl DatasetGraph {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            instances: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, instance: Instance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    /// Ids of all instances of one model
    pub fn ids_of_model(&self, model: &str) -> Vec<Id> {
        self.instances
            .values()
            .filter(|instance| instance.model == model)
            .map(|instance| instance.id.clone())
            .collect()
    }

    pub fn count_of_model(&self, model: &str) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.model == model)
            .count()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
