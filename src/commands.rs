//! The abstracted command surface: the operations a front end (CLI, web, CI
//! job) composes. Front ends themselves are external collaborators; these
//! functions are the whole contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::logic::migrate::MigrationEngine;
use crate::logic::transform::TransformationRegistry;
use crate::model::{BatchReport, ChangeDescriptor, MigrationConfig};
use crate::store::dataset::JsonDatasetStore;
use crate::store::descriptors::FsDescriptorStore;
use crate::store::traits::{DescriptorStore, RepoAccess};

/// Process setup: load `.env` if present and initialize logging.
/// Safe to call more than once.
pub fn bootstrap() {
    dotenvy::dotenv().ok();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// The descriptor store inside a schema repository checkout, rooted at the
/// configured migrations directory
pub fn descriptor_store_in(repo_dir: &Path) -> anyhow::Result<FsDescriptorStore> {
    let config = AppConfig::load()?;
    Ok(FsDescriptorStore::new(
        repo_dir.join(config.engine.migrations_dir),
    ))
}

/// Write a descriptor template bound to a sentinel commit, defaulting to the
/// most recent commit on the configured default branch. Returns the storage
/// key of the new template.
pub async fn create_change_template<R: RepoAccess + ?Sized>(
    repo: &R,
    store: &dyn DescriptorStore,
    reference: Option<&str>,
) -> anyhow::Result<String> {
    let config = AppConfig::load()?;
    let reference = reference.unwrap_or(&config.engine.default_branch);
    let sentinel = repo
        .resolve(reference)
        .await
        .with_context(|| format!("cannot resolve '{}' to a sentinel commit", reference))?;

    let key = store.save(&ChangeDescriptor::template(sentinel)).await?;
    Ok(key)
}

/// Write a reusable migration config for a set of dataset files
pub async fn create_migration_config(
    schema_repo_url: impl Into<String>,
    branch: impl Into<String>,
    schema_file: impl Into<PathBuf>,
    files: Vec<PathBuf>,
    out_path: &Path,
) -> anyhow::Result<MigrationConfig> {
    let config = MigrationConfig {
        files_to_migrate: files,
        schema_repo_url: schema_repo_url.into(),
        branch: branch.into(),
        schema_file: schema_file.into(),
    };
    let content = serde_json::to_string_pretty(&config)?;
    tokio::fs::write(out_path, content)
        .await
        .with_context(|| format!("cannot write migration config '{}'", out_path.display()))?;
    log::info!("wrote migration config '{}'", out_path.display());
    Ok(config)
}

/// Execute the orchestrator over a stored migration config.
///
/// The run as a whole succeeds only if every requested file migrated; callers
/// derive their exit status from `BatchReport::all_succeeded`.
pub async fn run_configured_migration<R: RepoAccess + 'static>(
    repo: Arc<R>,
    descriptor_store: &dyn DescriptorStore,
    registry: TransformationRegistry,
    config_path: &Path,
) -> anyhow::Result<BatchReport> {
    let content = tokio::fs::read_to_string(config_path)
        .await
        .with_context(|| format!("cannot read migration config '{}'", config_path.display()))?;
    let migration_config: MigrationConfig = serde_json::from_str(&content)
        .with_context(|| format!("invalid migration config '{}'", config_path.display()))?;

    if migration_config.schema_repo_url != repo.url() {
        anyhow::bail!(
            "migration config names schema repository '{}' but '{}' is open",
            migration_config.schema_repo_url,
            repo.url()
        );
    }

    run_batch(
        repo,
        descriptor_store,
        registry,
        &migration_config.files_to_migrate,
    )
    .await
}

/// Run the orchestrator ad hoc over some dataset files
pub async fn migrate_files<R: RepoAccess + 'static>(
    repo: Arc<R>,
    descriptor_store: &dyn DescriptorStore,
    registry: TransformationRegistry,
    files: &[PathBuf],
) -> anyhow::Result<BatchReport> {
    run_batch(repo, descriptor_store, registry, files).await
}

async fn run_batch<R: RepoAccess + 'static>(
    repo: Arc<R>,
    descriptor_store: &dyn DescriptorStore,
    registry: TransformationRegistry,
    files: &[PathBuf],
) -> anyhow::Result<BatchReport> {
    let app_config = AppConfig::load()?;
    let descriptors = descriptor_store.load_all().await?;
    log::info!(
        "migrating {} file(s) against {} descriptor(s)",
        files.len(),
        descriptors.len()
    );

    let engine = MigrationEngine::new(
        repo,
        Arc::new(JsonDatasetStore::new()),
        registry,
        app_config.engine,
    );
    let report = engine.migrate_batch(&descriptors, files, None).await?;

    for failure in &report.failed {
        log::warn!("'{}' failed: {}", failure.file.display(), failure.error);
    }
    Ok(report)
}
