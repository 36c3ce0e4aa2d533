//! Tenant-scoped storage for websites and pages.

mod scope;
mod sqlite;
mod traits;
mod types;

pub use scope::TenantScope;
pub use sqlite::SqliteStore;
pub use traits::{PipelineStore, StoreError};
pub use types::*;
