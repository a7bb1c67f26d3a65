use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::model::{hash_prefix, CommitHash};
use crate::store::snapshot_cache::SnapshotCache;
use crate::store::traits::RepoAccess;

/// One commit that is not unambiguously covered by a single sentinel domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelViolation {
    pub commit: CommitHash,
    /// Nearest upstream sentinels reachable without crossing another sentinel
    pub upstream: Vec<CommitHash>,
    /// Nearest downstream sentinels reachable without crossing another sentinel
    pub downstream: Vec<CommitHash>,
}

/// All sentinel-placement violations found in a commit range.
///
/// A violation is a configuration defect in the schema repository's
/// descriptors, not a data defect: it admits non-deterministic migration
/// outcomes and must halt migration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViolationReport {
    pub violations: Vec<SentinelViolation>,
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in &self.violations {
            writeln!(
                f,
                "commit {}: {} upstream sentinel(s) [{}], {} downstream sentinel(s) [{}]",
                hash_prefix(&violation.commit),
                violation.upstream.len(),
                violation
                    .upstream
                    .iter()
                    .map(|h| hash_prefix(h))
                    .collect::<Vec<_>>()
                    .join(", "),
                violation.downstream.len(),
                violation
                    .downstream
                    .iter()
                    .map(|h| hash_prefix(h))
                    .collect::<Vec<_>>()
                    .join(", "),
            )?;
        }
        Ok(())
    }
}

/// Collect the commits between `start` and `target`: descendants-or-equal of
/// `start` that are ancestors-or-equal of `target`.
pub async fn collect_range<R: RepoAccess + ?Sized>(
    repo: &R,
    start: &CommitHash,
    target: &CommitHash,
) -> Result<HashSet<CommitHash>, MigrateError> {
    if !repo.is_ancestor(start, target).await? {
        return Err(MigrateError::RepositoryAccess(format!(
            "recorded commit {} is not an ancestor of target {}",
            hash_prefix(start),
            hash_prefix(target)
        )));
    }

    let mut range = HashSet::from([target.clone()]);
    let mut queue = VecDeque::from([target.clone()]);
    while let Some(current) = queue.pop_front() {
        if &current == start {
            continue;
        }
        for parent in repo.parents(&current).await? {
            // parents outside the start..target cone are not part of the migration
            if !range.contains(&parent) && repo.is_ancestor(start, &parent).await? {
                range.insert(parent.clone());
                queue.push_back(parent);
            }
        }
    }
    Ok(range)
}

/// Checks that the sentinel commits partition a commit range into
/// unambiguous domains.
pub struct SentinelValidator;

impl SentinelValidator {
    /// Verify the sentinel-placement invariant over the commits between a
    /// dataset's recorded commit and the migration target: every
    /// schema-changing non-sentinel commit must have exactly one nearest
    /// upstream sentinel and at most one nearest downstream sentinel.
    ///
    /// The recorded commit acts as the implicit boundary sentinel of the
    /// first domain.
    pub async fn validate<R: RepoAccess + ?Sized>(
        repo: &R,
        cache: &SnapshotCache,
        start: &CommitHash,
        target: &CommitHash,
        sentinels: &HashSet<CommitHash>,
    ) -> Result<(), MigrateError> {
        let range = collect_range(repo, start, target).await?;

        // child edges within the range
        let mut children: HashMap<CommitHash, Vec<CommitHash>> = HashMap::new();
        for commit in &range {
            for parent in repo.parents(commit).await? {
                if range.contains(&parent) {
                    children.entry(parent).or_default().push(commit.clone());
                }
            }
        }

        let mut boundaries: HashSet<CommitHash> = sentinels
            .iter()
            .filter(|s| range.contains(*s))
            .cloned()
            .collect();
        boundaries.insert(start.clone());

        let mut report = ViolationReport::default();
        for commit in &range {
            if boundaries.contains(commit) {
                continue;
            }
            if !Self::changes_schema(repo, cache, commit).await? {
                continue;
            }

            let upstream =
                Self::nearest_boundaries(repo, commit, &boundaries, &range, Direction::Upstream, &children)
                    .await?;
            let downstream = Self::nearest_boundaries(
                repo,
                commit,
                &boundaries,
                &range,
                Direction::Downstream,
                &children,
            )
            .await?;

            if upstream.len() != 1 || downstream.len() > 1 {
                report.violations.push(SentinelViolation {
                    commit: commit.clone(),
                    upstream,
                    downstream,
                });
            }
        }

        if report.violations.is_empty() {
            Ok(())
        } else {
            // deterministic report order
            report.violations.sort_by(|a, b| a.commit.cmp(&b.commit));
            log::warn!(
                "sentinel placement violated for {} commit(s) between {} and {}",
                report.violations.len(),
                hash_prefix(start),
                hash_prefix(target)
            );
            Err(MigrateError::SentinelPlacement(report))
        }
    }

    /// A commit changes the schema when its snapshot differs from every
    /// parent's snapshot (a merge that adopts one parent's schema unchanged
    /// authors nothing new).
    async fn changes_schema<R: RepoAccess + ?Sized>(
        repo: &R,
        cache: &SnapshotCache,
        commit: &CommitHash,
    ) -> Result<bool, MigrateError> {
        let parents = repo.parents(commit).await?;
        let own = cache.get_or_load(repo, commit).await?;
        if parents.is_empty() {
            return Ok(!own.models.is_empty());
        }
        for parent in &parents {
            let parent_snapshot = cache.get_or_load(repo, parent).await?;
            if *parent_snapshot == *own {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Walk away from a commit in one direction, collecting the first
    /// boundary sentinel on each path without crossing it.
    async fn nearest_boundaries<R: RepoAccess + ?Sized>(
        repo: &R,
        commit: &CommitHash,
        boundaries: &HashSet<CommitHash>,
        range: &HashSet<CommitHash>,
        direction: Direction,
        children: &HashMap<CommitHash, Vec<CommitHash>>,
    ) -> Result<Vec<CommitHash>, MigrateError> {
        let mut found = HashSet::new();
        let mut visited = HashSet::from([commit.clone()]);
        let mut queue = VecDeque::from([commit.clone()]);

        while let Some(current) = queue.pop_front() {
            let next: Vec<CommitHash> = match direction {
                Direction::Upstream => repo
                    .parents(&current)
                    .await?
                    .into_iter()
                    .filter(|p| range.contains(p))
                    .collect(),
                Direction::Downstream => children.get(&current).cloned().unwrap_or_default(),
            };
            for neighbor in next {
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                if boundaries.contains(&neighbor) {
                    found.insert(neighbor);
                } else {
                    queue.push_back(neighbor);
                }
            }
        }

        let mut found: Vec<CommitHash> = found.into_iter().collect();
        found.sort();
        Ok(found)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrType, AttributeDef, ModelDef, SchemaSnapshot};
    use crate::store::memory::InMemoryRepo;

    fn schema(models: &[&str]) -> SchemaSnapshot {
        SchemaSnapshot::new(
            models
                .iter()
                .map(|name| ModelDef::new(*name, vec![AttributeDef::new("name", AttrType::String)]))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_linear_history_validates() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema(&["A"]), "base").unwrap();
        let _change = repo.commit_schema("main", &schema(&["A", "B"]), "add B").unwrap();
        let sentinel = repo
            .commit_schema("main", &schema(&["A", "B", "C"]), "add C")
            .unwrap();

        let cache = SnapshotCache::new();
        let sentinels = HashSet::from([sentinel.clone()]);
        SentinelValidator::validate(&repo, &cache, &start, &sentinel, &sentinels)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_commits_are_exempt() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema(&["A"]), "base").unwrap();
        // same schema as the start commit: not a schema change
        let quiet = repo.commit_schema("main", &schema(&["A"]), "docs only").unwrap();

        let cache = SnapshotCache::new();
        SentinelValidator::validate(&repo, &cache, &start, &quiet, &HashSet::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_two_upstream_sentinels_violate() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema(&["A"]), "base").unwrap();
        let left = repo
            .commit_with_parents(None, vec![start.clone()], &schema(&["A", "L"]), "left")
            .unwrap();
        let right = repo
            .commit_with_parents(None, vec![start.clone()], &schema(&["A", "R"]), "right")
            .unwrap();
        // merge adopts the left schema unchanged, then a new change follows
        let merge = repo
            .commit_with_parents(Some("main"), vec![left.clone(), right.clone()], &schema(&["A", "L"]), "merge")
            .unwrap();
        let tip = repo
            .commit_with_parents(Some("main"), vec![merge], &schema(&["A", "L", "T"]), "tip")
            .unwrap();

        let cache = SnapshotCache::new();
        let sentinels = HashSet::from([left.clone(), right.clone()]);
        let err = SentinelValidator::validate(&repo, &cache, &start, &tip, &sentinels)
            .await
            .unwrap_err();
        match err {
            MigrateError::SentinelPlacement(report) => {
                assert_eq!(report.violations.len(), 1);
                assert_eq!(report.violations[0].commit, tip);
                assert_eq!(report.violations[0].upstream.len(), 2);
            }
            other => panic!("expected SentinelPlacement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_downstream_sentinels_violate() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema(&["A"]), "base").unwrap();
        let change = repo
            .commit_with_parents(None, vec![start.clone()], &schema(&["A", "B"]), "change")
            .unwrap();
        let s1 = repo
            .commit_with_parents(None, vec![change.clone()], &schema(&["A", "B", "X"]), "s1")
            .unwrap();
        let s2 = repo
            .commit_with_parents(None, vec![change.clone()], &schema(&["A", "B", "Y"]), "s2")
            .unwrap();
        let merge = repo
            .commit_with_parents(Some("main"), vec![s1.clone(), s2.clone()], &schema(&["A", "B", "X"]), "merge")
            .unwrap();

        let cache = SnapshotCache::new();
        let sentinels = HashSet::from([s1.clone(), s2.clone()]);
        let err = SentinelValidator::validate(&repo, &cache, &start, &merge, &sentinels)
            .await
            .unwrap_err();
        match err {
            MigrateError::SentinelPlacement(report) => {
                let violation = report
                    .violations
                    .iter()
                    .find(|v| v.commit == change)
                    .expect("the forked change commit must violate");
                assert_eq!(violation.downstream.len(), 2);
            }
            other => panic!("expected SentinelPlacement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_not_ancestor_of_target() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema(&["A"]), "base").unwrap();
        let other = repo
            .commit_with_parents(None, vec![], &schema(&["Z"]), "unrelated root")
            .unwrap();

        let cache = SnapshotCache::new();
        let err = SentinelValidator::validate(&repo, &cache, &start, &other, &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::RepositoryAccess(_)));
    }
}
