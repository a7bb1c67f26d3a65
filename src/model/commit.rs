use serde::{Deserialize, Serialize};

use crate::model::{CommitHash, SchemaSnapshot};

/// A commit is an immutable node in the schema repository's history DAG.
/// Carries the schema content at that point as a compressed binary blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitNode {
    /// SHA-256 hash of the commit content
    pub hash: CommitHash,
    /// Parent commit hashes (empty for the initial commit, two or more for merges)
    pub parents: Vec<CommitHash>,
    /// Commit author
    pub author: Option<String>,
    /// Commit message
    pub message: Option<String>,
    /// When the commit was created
    pub created_at: String, // ISO 8601 string

    /// Compressed binary data containing the schema definition
    pub schema_data: Vec<u8>,
    /// Uncompressed size for monitoring
    pub schema_size: i64,
}

impl CommitNode {
    /// Create a new commit holding the given schema
    pub fn new(
        parents: Vec<CommitHash>,
        schema: &SchemaSnapshot,
        author: Option<String>,
        message: Option<String>,
    ) -> anyhow::Result<Self> {
        let serialized = serde_json::to_string(schema)?;
        let compressed = Self::compress_data(serialized.as_bytes());
        let hash = Self::calculate_hash(
            &parents,
            &serialized,
            author.as_deref(),
            message.as_deref(),
        );

        Ok(Self {
            hash,
            parents,
            author,
            message,
            created_at: chrono::Utc::now().to_rfc3339(),
            schema_data: compressed,
            schema_size: serialized.len() as i64,
        })
    }

    /// Calculate SHA-256 hash for the commit
    fn calculate_hash(
        parents: &[CommitHash],
        schema: &str,
        author: Option<&str>,
        message: Option<&str>,
    ) -> CommitHash {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        for parent in parents {
            hasher.update(format!("parent:{}\n", parent));
        }
        if let Some(author) = author {
            hasher.update(format!("author:{}\n", author));
        }
        if let Some(message) = message {
            hasher.update(format!("message:{}\n", message));
        }
        hasher.update(format!("schema:{}\n", schema));

        hex::encode(hasher.finalize())
    }

    /// Compress data using gzip
    fn compress_data(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        // writing to a Vec cannot fail
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Decompress data from gzip
    fn decompress_data(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        // gzip magic bytes (1f 8b); uncompressed blobs pass through as-is
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            let mut decoder = GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            Ok(decompressed)
        } else {
            Ok(data.to_vec())
        }
    }

    /// Decompress and deserialize the schema stored in this commit
    pub fn get_schema(&self) -> anyhow::Result<SchemaSnapshot> {
        let decompressed = Self::decompress_data(&self.schema_data)?;
        let json_str = String::from_utf8(decompressed)?;
        let snapshot: SchemaSnapshot = serde_json::from_str(&json_str)?;
        Ok(snapshot)
    }

    /// Create an initial commit with an empty schema
    pub fn create_initial(author: Option<String>) -> Self {
        let empty_schema = SchemaSnapshot::new(Vec::new());
        // an empty snapshot always serializes
        Self::new(
            Vec::new(),
            &empty_schema,
            author,
            Some("Initial empty commit".to_string()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrType, AttributeDef, ModelDef};

    #[test]
    fn test_commit_schema_round_trip() {
        let schema = SchemaSnapshot::new(vec![ModelDef::new(
            "Part",
            vec![AttributeDef::new("weight", AttrType::Float)],
        )]);
        let commit = CommitNode::new(Vec::new(), &schema, Some("tester".into()), None).unwrap();

        assert_eq!(commit.hash.len(), 64);
        assert_eq!(commit.get_schema().unwrap(), schema);
    }

    #[test]
    fn test_hash_depends_on_schema_and_parents() {
        let schema_a = SchemaSnapshot::new(vec![ModelDef::new("A", vec![])]);
        let schema_b = SchemaSnapshot::new(vec![ModelDef::new("B", vec![])]);

        let root = CommitNode::new(Vec::new(), &schema_a, None, None).unwrap();
        let same = CommitNode::new(Vec::new(), &schema_a, None, None).unwrap();
        let changed = CommitNode::new(Vec::new(), &schema_b, None, None).unwrap();
        let child = CommitNode::new(vec![root.hash.clone()], &schema_a, None, None).unwrap();

        assert_eq!(root.hash, same.hash);
        assert_ne!(root.hash, changed.hash);
        assert_ne!(root.hash, child.hash);
    }

    #[test]
    fn test_initial_commit_is_empty() {
        let initial = CommitNode::create_initial(None);
        assert!(initial.parents.is_empty());
        assert!(initial.get_schema().unwrap().models.is_empty());
    }
}
