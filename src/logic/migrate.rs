use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::MigrateError;
use crate::logic::diff::SchemaDiffer;
use crate::logic::order::TopologicalOrderer;
use crate::logic::sentinel::SentinelValidator;
use crate::logic::transform::{DataTransformer, TransformationRegistry};
use crate::model::{
    hash_prefix, BatchReport, ChangeDescriptor, CommitHash, FileFailure, FileMigrationReport,
    MigrationSummary,
};
use crate::store::snapshot_cache::SnapshotCache;
use crate::store::traits::{DatasetStore, RepoAccess};

/// The validated, ordered work for one file: everything needed to execute its
/// migration, computed without writing anything.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub file: PathBuf,
    pub start: CommitHash,
    pub target: CommitHash,
    /// Descriptors to apply, oldest first
    pub chain: Vec<ChangeDescriptor>,
}

/// Drives end-to-end migration of dataset files against one schema repository.
pub struct MigrationEngine<R: RepoAccess + 'static> {
    repo: Arc<R>,
    datasets: Arc<dyn DatasetStore>,
    snapshots: Arc<SnapshotCache>,
    registry: TransformationRegistry,
    config: EngineConfig,
}

impl<R: RepoAccess + 'static> Clone for MigrationEngine<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            datasets: self.datasets.clone(),
            snapshots: self.snapshots.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: RepoAccess + 'static> MigrationEngine<R> {
    pub fn new(
        repo: Arc<R>,
        datasets: Arc<dyn DatasetStore>,
        registry: TransformationRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            datasets,
            snapshots: Arc::new(SnapshotCache::new()),
            registry,
            config,
        }
    }

    /// Where a migrated file is written: the input path itself, or a suffixed
    /// sibling when not migrating in place
    pub fn output_path(&self, input: &Path) -> PathBuf {
        if self.config.migrate_in_place {
            return input.to_path_buf();
        }
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        let suffixed = match input.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}{}.{}", stem, self.config.migrate_suffix, ext),
            None => format!("{}{}", stem, self.config.migrate_suffix),
        };
        input.with_file_name(suffixed)
    }

    /// Validate and order the migration of one file without touching it.
    ///
    /// The target defaults to the head of the file's recorded branch, which
    /// makes the chain end at the most recent applicable sentinel.
    pub async fn plan_file(
        &self,
        descriptors: &[ChangeDescriptor],
        file: &Path,
        target: Option<&str>,
    ) -> Result<MigrationPlan, MigrateError> {
        let graph = self.datasets.read(file).await?;
        let start = self.repo.resolve(&graph.provenance.commit_hash).await?;
        let target = match target {
            Some(reference) => self.repo.resolve(reference).await?,
            None => self.repo.resolve(&graph.provenance.branch).await?,
        };

        // every descriptor must document a real commit
        let mut by_sentinel: HashMap<CommitHash, ChangeDescriptor> = HashMap::new();
        for descriptor in descriptors {
            let sentinel = self.repo.resolve(&descriptor.commit_hash).await?;
            by_sentinel.insert(sentinel, descriptor.clone());
        }
        let sentinels: HashSet<CommitHash> = by_sentinel.keys().cloned().collect();

        SentinelValidator::validate(
            self.repo.as_ref(),
            &self.snapshots,
            &start,
            &target,
            &sentinels,
        )
        .await?;
        let ordered =
            TopologicalOrderer::order(self.repo.as_ref(), &start, &target, &sentinels).await?;

        let chain = ordered
            .into_iter()
            .map(|hash| by_sentinel.remove(&hash).unwrap())
            .collect();
        Ok(MigrationPlan {
            file: file.to_path_buf(),
            start,
            target,
            chain,
        })
    }

    /// Run a validated plan: read the file, apply each descriptor in order,
    /// and atomically write the result with advanced provenance. Nothing is
    /// written on failure.
    pub async fn execute_plan(
        &self,
        plan: &MigrationPlan,
    ) -> Result<FileMigrationReport, MigrateError> {
        let mut graph = self.datasets.read(&plan.file).await?;
        let mut summary = MigrationSummary::default();
        let mut current = plan.start.clone();

        for descriptor in &plan.chain {
            let before = self
                .snapshots
                .get_or_load(self.repo.as_ref(), &current)
                .await?;
            let after = self
                .snapshots
                .get_or_load(self.repo.as_ref(), &descriptor.commit_hash)
                .await?;
            let delta = SchemaDiffer::diff(
                &before,
                &after,
                &descriptor.renamed_models,
                &descriptor.renamed_attributes,
            )?;

            let hook = match &descriptor.transformations_file {
                Some(key) => Some(self.registry.get(key).ok_or_else(|| {
                    MigrateError::Transformation(format!("unknown transformation '{}'", key))
                })?),
                None => None,
            };

            let mut step_summary = MigrationSummary::default();
            DataTransformer::apply(
                &mut graph,
                &delta,
                &before,
                &after,
                hook.as_deref(),
                &mut step_summary,
            )?;
            summary.absorb(step_summary);

            log::debug!(
                "applied descriptor {} to '{}'",
                hash_prefix(&descriptor.commit_hash),
                plan.file.display()
            );
            current = descriptor.commit_hash.clone();
        }

        let written_to = if plan.chain.is_empty() {
            // already up to date: leave the file untouched
            log::info!("'{}' is already up to date", plan.file.display());
            plan.file.clone()
        } else {
            graph.provenance.commit_hash = current.clone();
            let out = self.output_path(&plan.file);
            self.datasets.write(&out, &graph).await?;
            log::info!(
                "migrated '{}' from {} to {} ({} step(s))",
                plan.file.display(),
                hash_prefix(&plan.start),
                hash_prefix(&current),
                plan.chain.len()
            );
            out
        };

        Ok(FileMigrationReport {
            file: plan.file.clone(),
            from_commit: plan.start.clone(),
            to_commit: current,
            steps: plan.chain.len(),
            written_to,
            summary,
            finished_at: chrono::Utc::now(),
        })
    }

    /// Migrate one file end-to-end
    pub async fn migrate_file(
        &self,
        descriptors: &[ChangeDescriptor],
        file: &Path,
        target: Option<&str>,
    ) -> Result<FileMigrationReport, MigrateError> {
        let plan = self.plan_file(descriptors, file, target).await?;
        self.execute_plan(&plan).await
    }

    /// Migrate a batch of independent files.
    ///
    /// Planning runs first for every file: a systemic error (sentinel
    /// placement, ambiguous order) aborts the whole batch before any write.
    /// Execution then runs in a bounded worker pool; each worker owns its
    /// instance graph, and one file's failure neither blocks nor rolls back
    /// the others.
    pub async fn migrate_batch(
        &self,
        descriptors: &[ChangeDescriptor],
        files: &[PathBuf],
        target: Option<&str>,
    ) -> Result<BatchReport, MigrateError> {
        let mut report = BatchReport::default();

        let mut plans = Vec::new();
        for file in files {
            match self.plan_file(descriptors, file, target).await {
                Ok(plan) => plans.push(plan),
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => report.failed.push(FileFailure {
                    file: file.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for plan in plans {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // closing the semaphore is impossible here, so acquire succeeds
                let _permit = semaphore.acquire_owned().await.unwrap();
                let outcome = engine.execute_plan(&plan).await;
                (plan.file, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(file_report))) => report.migrated.push(file_report),
                Ok((file, Err(e))) => {
                    log::warn!("migration of '{}' failed: {}", file.display(), e);
                    report.failed.push(FileFailure {
                        file,
                        error: e.to_string(),
                    });
                }
                Err(join_error) => {
                    return Err(MigrateError::Dataset(format!(
                        "migration worker panicked: {}",
                        join_error
                    )))
                }
            }
        }

        // completion order is nondeterministic; reports are not
        report.migrated.sort_by(|a, b| a.file.cmp(&b.file));
        report.failed.sort_by(|a, b| a.file.cmp(&b.file));

        log::info!(
            "batch finished: {} migrated, {} failed",
            report.migrated.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
