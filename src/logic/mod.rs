pub mod diff;
pub mod migrate;
pub mod order;
pub mod sentinel;
pub mod transform;

pub use diff::{ModelMigration, RetypedAttr, SchemaDelta, SchemaDiffer};
pub use migrate::{MigrationEngine, MigrationPlan};
pub use order::TopologicalOrderer;
pub use sentinel::{SentinelValidator, SentinelViolation, ViolationReport};
pub use transform::{DataTransformer, TransformContext, Transformation, TransformationRegistry};
