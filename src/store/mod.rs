pub mod bundle;
pub mod dataset;
pub mod descriptors;
pub mod memory;
pub mod snapshot_cache;
pub mod traits;

pub use bundle::{export_bundle, open_bundle};
pub use dataset::JsonDatasetStore;
pub use descriptors::FsDescriptorStore;
pub use memory::InMemoryRepo;
pub use snapshot_cache::SnapshotCache;
pub use traits::{DatasetStore, DescriptorStore, RepoAccess};
