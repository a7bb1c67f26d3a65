pub mod commands;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use config::{AppConfig, EngineConfig};
pub use error::MigrateError;

// Export logic types
pub use logic::{
    DataTransformer, MigrationEngine, MigrationPlan, SchemaDelta, SchemaDiffer, SentinelValidator,
    TopologicalOrderer, TransformContext, Transformation, TransformationRegistry, ViolationReport,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{
    export_bundle, open_bundle, DatasetStore, DescriptorStore, FsDescriptorStore, InMemoryRepo,
    JsonDatasetStore, RepoAccess, SnapshotCache,
};
