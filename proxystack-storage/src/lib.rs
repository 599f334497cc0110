//! In-memory internal object API for ProxyStack
//!
//! Serves the versioned `/v1/AUTH_<account>[/<container>[/<object>]]` API
//! the proxy middleware dispatches subrequests to. Meant for local runs and
//! tests; nothing is persisted.

mod api;
mod memory;
mod traits;


pub use api::{InternalApi, API_VERSION};
pub use memory::MemoryStorage;
pub use traits::{
    AccountStats, ContainerStats, ContainerSummary, ListQuery, ListingEntry, ObjectStorage,
    ObjectSummary, StorageError, StoredObject,
};
