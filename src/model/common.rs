use serde::{Deserialize, Serialize};

pub type Id = String;

/// Full hex hash identifying a commit in the schema repository.
pub type CommitHash = String;

/// Abbreviated hash length used in descriptor filenames and log output.
pub const HASH_PREFIX_LEN: usize = 7;

/// Get a commit hash's prefix
pub fn hash_prefix(hash: &str) -> &str {
    if hash.len() > HASH_PREFIX_LEN {
        &hash[..HASH_PREFIX_LEN]
    } else {
        hash
    }
}

/// Check that a string looks like a full commit hash (SHA-1 or SHA-256 hex)
pub fn is_commit_hash(candidate: &str) -> bool {
    (candidate.len() == 40 || candidate.len() == 64)
        && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

/// Type tag of a schema attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    Enum {
        choices: Vec<String>,
    },
    /// Relationship attribute holding key-based references to instances
    /// of the target model
    Ref {
        target: String,
        many: bool,
    },
}

impl AttrType {
    /// Relationship attributes are stored separately from scalar values
    pub fn is_ref(&self) -> bool {
        matches!(self, AttrType::Ref { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_prefix() {
        let hash = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert_eq!(hash_prefix(hash), "0123456");
        assert_eq!(hash_prefix("abc"), "abc");
    }

    #[test]
    fn test_is_commit_hash() {
        assert!(is_commit_hash(&"a".repeat(40)));
        assert!(is_commit_hash(&"0".repeat(64)));
        assert!(!is_commit_hash("not-a-hash"));
        assert!(!is_commit_hash(&"g".repeat(40)));
    }

    #[test]
    fn test_attr_type_serde() {
        let json = r#"{"kind":"ref","target":"Color","many":true}"#;
        let parsed: AttrType = serde_json::from_str(json).unwrap();
        assert!(parsed.is_ref());
        assert_eq!(
            parsed,
            AttrType::Ref {
                target: "Color".to_string(),
                many: true
            }
        );

        let json = r#"{"kind":"float"}"#;
        let parsed: AttrType = serde_json::from_str(json).unwrap();
        assert!(!parsed.is_ref());
    }
}
