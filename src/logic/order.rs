use itertools::Itertools;
use std::collections::HashSet;

use crate::error::MigrateError;
use crate::model::{hash_prefix, CommitHash};
use crate::store::traits::RepoAccess;

/// Produces the deterministic sequence of sentinel commits to apply between a
/// dataset's recorded commit and a target commit.
pub struct TopologicalOrderer;

impl TopologicalOrderer {
    /// Restrict the sentinels to descendants of `start` that are
    /// ancestors-or-equal of `target`, verify that ancestry totally orders
    /// them, and return the chain oldest-first.
    ///
    /// An incomparable pair is the formal signature of a sentinel-placement
    /// defect: different topological sorts would apply renames in different
    /// orders, so the tie is never broken arbitrarily.
    pub async fn order<R: RepoAccess + ?Sized>(
        repo: &R,
        start: &CommitHash,
        target: &CommitHash,
        sentinels: &HashSet<CommitHash>,
    ) -> Result<Vec<CommitHash>, MigrateError> {
        let mut applicable = Vec::new();
        for sentinel in sentinels {
            if sentinel == start {
                continue;
            }
            if repo.is_ancestor(start, sentinel).await?
                && repo.is_ancestor(sentinel, target).await?
            {
                applicable.push(sentinel.clone());
            }
        }
        // stable input order regardless of set iteration
        applicable.sort();

        let mut incomparable = Vec::new();
        for (a, b) in applicable.iter().tuple_combinations() {
            if !repo.is_ancestor(a, b).await? && !repo.is_ancestor(b, a).await? {
                incomparable.push((a.clone(), b.clone()));
            }
        }
        if !incomparable.is_empty() {
            log::warn!(
                "{} incomparable sentinel pair(s) between {} and {}",
                incomparable.len(),
                hash_prefix(start),
                hash_prefix(target)
            );
            return Err(MigrateError::AmbiguousOrder {
                pairs: incomparable,
            });
        }

        // in a chain, a sentinel's position is its number of ancestors
        // within the chain (counting itself)
        let mut ranked = Vec::with_capacity(applicable.len());
        for sentinel in &applicable {
            let mut rank = 0usize;
            for other in &applicable {
                if repo.is_ancestor(other, sentinel).await? {
                    rank += 1;
                }
            }
            ranked.push((rank, sentinel.clone()));
        }
        ranked.sort();

        Ok(ranked.into_iter().map(|(_, sentinel)| sentinel).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDef, SchemaSnapshot};
    use crate::store::memory::InMemoryRepo;

    fn schema(model: &str) -> SchemaSnapshot {
        SchemaSnapshot::new(vec![ModelDef::new(model, vec![])])
    }

    #[tokio::test]
    async fn test_chain_ordering() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema("A"), "base").unwrap();
        let s1 = repo.commit_schema("main", &schema("B"), "one").unwrap();
        let s2 = repo.commit_schema("main", &schema("C"), "two").unwrap();
        let s3 = repo.commit_schema("main", &schema("D"), "three").unwrap();

        let sentinels = HashSet::from([s3.clone(), s1.clone(), s2.clone()]);
        let chain = TopologicalOrderer::order(&repo, &start, &s3, &sentinels)
            .await
            .unwrap();
        assert_eq!(chain, vec![s1, s2, s3]);
    }

    #[tokio::test]
    async fn test_sentinels_outside_range_excluded() {
        let repo = InMemoryRepo::new("mem://repo");
        let before = repo.commit_schema("main", &schema("A"), "old").unwrap();
        let start = repo.commit_schema("main", &schema("B"), "base").unwrap();
        let s1 = repo.commit_schema("main", &schema("C"), "one").unwrap();
        let after = repo.commit_schema("main", &schema("D"), "later").unwrap();

        // `before` predates the start; `after` is beyond the target
        let sentinels = HashSet::from([before, s1.clone(), after]);
        let chain = TopologicalOrderer::order(&repo, &start, &s1, &sentinels)
            .await
            .unwrap();
        assert_eq!(chain, vec![s1]);
    }

    #[tokio::test]
    async fn test_start_itself_not_in_chain() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema("A"), "base").unwrap();
        let s1 = repo.commit_schema("main", &schema("B"), "one").unwrap();

        let sentinels = HashSet::from([start.clone(), s1.clone()]);
        let chain = TopologicalOrderer::order(&repo, &start, &s1, &sentinels)
            .await
            .unwrap();
        assert_eq!(chain, vec![s1]);
    }

    #[tokio::test]
    async fn test_incomparable_sentinels_rejected() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema("A"), "base").unwrap();
        let left = repo
            .commit_with_parents(None, vec![start.clone()], &schema("L"), "left")
            .unwrap();
        let right = repo
            .commit_with_parents(None, vec![start.clone()], &schema("R"), "right")
            .unwrap();
        let merge = repo
            .commit_with_parents(Some("main"), vec![left.clone(), right.clone()], &schema("M"), "merge")
            .unwrap();

        let sentinels = HashSet::from([left.clone(), right.clone()]);
        let err = TopologicalOrderer::order(&repo, &start, &merge, &sentinels)
            .await
            .unwrap_err();
        match err {
            MigrateError::AmbiguousOrder { pairs } => {
                assert_eq!(pairs.len(), 1);
                let (a, b) = &pairs[0];
                assert!(HashSet::from([a.clone(), b.clone()]) == HashSet::from([left, right]));
            }
            other => panic!("expected AmbiguousOrder, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_when_up_to_date() {
        let repo = InMemoryRepo::new("mem://repo");
        let start = repo.commit_schema("main", &schema("A"), "base").unwrap();
        let chain = TopologicalOrderer::order(&repo, &start, &start, &HashSet::new())
            .await
            .unwrap();
        assert!(chain.is_empty());
    }
}
