use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::MigrateError;
use crate::model::{CommitHash, CommitNode, SchemaSnapshot};
use crate::store::traits::RepoAccess;

/// A schema repository held entirely in memory: a commit DAG plus branch heads.
///
/// Backs tests and repo bundles. Ancestry queries are memoized so repeated
/// `is_ancestor` calls for the same pair never re-traverse the DAG.
#[derive(Debug)]
pub struct InMemoryRepo {
    url: String,
    inner: RwLock<RepoInner>,
    ancestry: RwLock<HashMap<(CommitHash, CommitHash), bool>>,
}

#[derive(Debug, Default)]
struct RepoInner {
    commits: HashMap<CommitHash, CommitNode>,
    branches: HashMap<String, CommitHash>,
}

impl InMemoryRepo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            inner: RwLock::new(RepoInner::default()),
            ancestry: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a repository from exported state (see `bundle`)
    pub fn from_state(
        url: impl Into<String>,
        branches: HashMap<String, CommitHash>,
        commits: Vec<CommitNode>,
    ) -> Self {
        let repo = Self::new(url);
        {
            let mut inner = repo.inner.write();
            for commit in commits {
                inner.commits.insert(commit.hash.clone(), commit);
            }
            inner.branches = branches;
        }
        repo
    }

    /// Snapshot the repository state for export
    pub fn export_state(&self) -> (HashMap<String, CommitHash>, Vec<CommitNode>) {
        let inner = self.inner.read();
        (
            inner.branches.clone(),
            inner.commits.values().cloned().collect(),
        )
    }

    /// Commit a schema on a branch; the branch head becomes the parent.
    /// Creates the branch if it does not exist yet.
    pub fn commit_schema(
        &self,
        branch: &str,
        schema: &SchemaSnapshot,
        message: &str,
    ) -> Result<CommitHash, MigrateError> {
        let parents = {
            let inner = self.inner.read();
            inner.branches.get(branch).cloned().into_iter().collect()
        };
        self.commit_with_parents(Some(branch), parents, schema, message)
    }

    /// Commit a schema with explicit parents; used to build merge commits
    /// and forked histories. Updates the branch head when given.
    pub fn commit_with_parents(
        &self,
        branch: Option<&str>,
        parents: Vec<CommitHash>,
        schema: &SchemaSnapshot,
        message: &str,
    ) -> Result<CommitHash, MigrateError> {
        let mut inner = self.inner.write();
        for parent in &parents {
            if !inner.commits.contains_key(parent) {
                return Err(MigrateError::RepositoryAccess(format!(
                    "parent commit '{}' not found",
                    parent
                )));
            }
        }
        let commit = CommitNode::new(parents, schema, None, Some(message.to_string()))
            .map_err(|e| MigrateError::RepositoryAccess(format!("cannot create commit: {}", e)))?;
        let hash = commit.hash.clone();
        inner.commits.insert(hash.clone(), commit);
        if let Some(branch) = branch {
            inner.branches.insert(branch.to_string(), hash.clone());
        }
        Ok(hash)
    }

    /// Point a new branch at an existing commit
    pub fn branch_from(&self, new_branch: &str, commit: &CommitHash) -> Result<(), MigrateError> {
        let mut inner = self.inner.write();
        if !inner.commits.contains_key(commit) {
            return Err(MigrateError::RepositoryAccess(format!(
                "commit '{}' not found",
                commit
            )));
        }
        inner.branches.insert(new_branch.to_string(), commit.clone());
        Ok(())
    }

    /// Current head of a branch
    pub fn head(&self, branch: &str) -> Option<CommitHash> {
        self.inner.read().branches.get(branch).cloned()
    }

    fn lookup_parents(&self, commit: &CommitHash) -> Result<Vec<CommitHash>, MigrateError> {
        let inner = self.inner.read();
        inner
            .commits
            .get(commit)
            .map(|c| c.parents.clone())
            .ok_or_else(|| MigrateError::RepositoryAccess(format!("commit '{}' not found", commit)))
    }

    /// BFS toward the roots, consulting and populating the memo table
    fn ancestor_walk(
        &self,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> Result<bool, MigrateError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let key = (ancestor.clone(), descendant.clone());
        if let Some(&answer) = self.ancestry.read().get(&key) {
            return Ok(answer);
        }

        let mut found = false;
        let mut queue = VecDeque::from([descendant.clone()]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            for parent in self.lookup_parents(&current)? {
                if &parent == ancestor {
                    found = true;
                    queue.clear();
                    break;
                }
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }

        self.ancestry.write().insert(key, found);
        Ok(found)
    }
}

#[async_trait::async_trait]
impl RepoAccess for InMemoryRepo {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn resolve(&self, reference: &str) -> Result<CommitHash, MigrateError> {
        let inner = self.inner.read();
        if let Some(head) = inner.branches.get(reference) {
            return Ok(head.clone());
        }
        if inner.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        // fall back to unique hash prefix
        if reference.len() >= 4 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut matches = inner
                .commits
                .keys()
                .filter(|hash| hash.starts_with(reference));
            if let Some(first) = matches.next() {
                if matches.next().is_some() {
                    return Err(MigrateError::RepositoryAccess(format!(
                        "reference '{}' matches multiple commits",
                        reference
                    )));
                }
                return Ok(first.clone());
            }
        }
        Err(MigrateError::RepositoryAccess(format!(
            "cannot resolve reference '{}'",
            reference
        )))
    }

    async fn parents(&self, commit: &CommitHash) -> Result<Vec<CommitHash>, MigrateError> {
        self.lookup_parents(commit)
    }

    async fn is_ancestor(
        &self,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> Result<bool, MigrateError> {
        self.ancestor_walk(ancestor, descendant)
    }

    async fn read_schema_at(&self, commit: &CommitHash) -> Result<SchemaSnapshot, MigrateError> {
        let node = {
            let inner = self.inner.read();
            inner.commits.get(commit).cloned().ok_or_else(|| {
                MigrateError::RepositoryAccess(format!("commit '{}' not found", commit))
            })?
        };
        node.get_schema().map_err(|e| {
            MigrateError::RepositoryAccess(format!(
                "cannot read schema at commit '{}': {}",
                commit, e
            ))
        })
    }
}
