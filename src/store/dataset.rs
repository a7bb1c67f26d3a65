use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::MigrateError;
use crate::model::{DatasetGraph, Instance, Provenance};
use crate::store::traits::DatasetStore;

/// On-disk shape of a dataset file: provenance metadata plus the instances
#[derive(Debug, Serialize, Deserialize)]
struct DatasetFile {
    provenance: Provenance,
    instances: Vec<Instance>,
}

/// Dataset store reading and writing JSON files.
///
/// Writes go to a temp file in the destination directory followed by a rename,
/// so a failed or canceled migration never leaves a partial file behind.
#[derive(Default)]
pub struct JsonDatasetStore;

impl JsonDatasetStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DatasetStore for JsonDatasetStore {
    async fn read(&self, path: &Path) -> Result<DatasetGraph, MigrateError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrateError::Dataset(format!("cannot read dataset '{}': {}", path.display(), e))
        })?;
        let file: DatasetFile = serde_json::from_str(&content).map_err(|e| {
            MigrateError::Dataset(format!("invalid dataset '{}': {}", path.display(), e))
        })?;

        let mut instances = BTreeMap::new();
        for instance in file.instances {
            if instances.contains_key(&instance.id) {
                return Err(MigrateError::Dataset(format!(
                    "duplicate instance id '{}' in dataset '{}'",
                    instance.id,
                    path.display()
                )));
            }
            instances.insert(instance.id.clone(), instance);
        }

        Ok(DatasetGraph {
            provenance: file.provenance,
            instances,
        })
    }

    async fn write(&self, path: &Path, graph: &DatasetGraph) -> Result<(), MigrateError> {
        let file = DatasetFile {
            provenance: graph.provenance.clone(),
            instances: graph.instances.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| MigrateError::Dataset(format!("cannot serialize dataset: {}", e)))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                MigrateError::Dataset(format!("invalid dataset path '{}'", path.display()))
            })?;
        let tmp = dir.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, content).await.map_err(|e| {
            MigrateError::Dataset(format!("cannot write dataset '{}': {}", tmp.display(), e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            // leave nothing behind on failure
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MigrateError::Dataset(format!(
                "cannot move dataset into place at '{}': {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> DatasetGraph {
        let mut graph = DatasetGraph::new(Provenance::new("mem://repo", "main", "a".repeat(64)));
        graph.insert(
            Instance::new("t1", "Test").with_attribute("size", serde_json::json!(3.5)),
        );
        graph.insert(
            Instance::new("h1", "Holder").with_reference("held", vec!["t1".to_string()]),
        );
        graph
    }

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = JsonDatasetStore::new();
        let graph = sample_graph();

        store.write(&path, &graph).await.unwrap();
        let loaded = store.read(&path).await.unwrap();
        assert_eq!(graph, loaded);

        // no temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let content = serde_json::json!({
            "provenance": {"repo_url": "r", "branch": "main", "commit_hash": "a".repeat(64)},
            "instances": [
                {"id": "x", "model": "Test", "attributes": {}},
                {"id": "x", "model": "Test", "attributes": {}}
            ]
        });
        tokio::fs::write(&path, content.to_string()).await.unwrap();

        let err = JsonDatasetStore::new().read(&path).await.unwrap_err();
        assert!(err.to_string().contains("duplicate instance id"));
    }

    #[tokio::test]
    async fn test_missing_file_is_dataset_error() {
        let store = JsonDatasetStore::new();
        let err = store.read(Path::new("/nonexistent/data.json")).await.unwrap_err();
        assert!(matches!(err, MigrateError::Dataset(_)));
    }
}
