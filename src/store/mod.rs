//! Object Store Adapters
//!
//! The queue location and the processed location are each an
//! `ObjectStore`. The pipeline only ever lists, fetches, renames, deletes,
//! and writes through this trait.

pub mod object_store;
pub mod simulated_store;
#[cfg(feature = "s3")]
pub mod s3_store;

pub use object_store::{
    list_all, AccessPolicy, InMemoryObjectStore, ListResult, LocalFsObjectStore, ObjectMeta,
    ObjectStore, PutOptions, UrlOptions,
};
pub use simulated_store::{SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats};
#[cfg(feature = "s3")]
pub use s3_store::{S3Config, S3ObjectStore};
