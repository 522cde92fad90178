//! Tenant-scoped storage abstractions for the permit domain.
//!
//! This crate defines the document-store contract the engine depends on:
//! - permit and work order aggregates (find-one / find / create / save)
//! - incident records logged against permits
//! - the dual-write intent log used by cross-aggregate transitions
//!
//! Design stance:
//! - Every query carries a tenant id; there is no cross-tenant read path.
//! - Saves replace the whole aggregate. There is no partial-update API.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use model::{
    BaseVersions, DualWriteIntent, ImageState, IntentState, PermitFilter, QueryWindow,
    WorkOrderFilter,
};
pub use traits::{IncidentStore, IntentLog, PermitStore, WorkOrderStore};
