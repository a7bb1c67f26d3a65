pub mod commit;
pub mod common;
pub mod descriptor;
pub mod instance;
pub mod migration;
pub mod schema;

pub use commit::*;
pub use common::*;
pub use descriptor::*;
pub use instance::*;
pub use migration::*;
pub use schema::*;
