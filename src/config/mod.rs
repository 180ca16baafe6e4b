// Configuration layer: on-disk layout constants and the serialized
// database / resource settings.

pub mod database;
pub mod paths;
pub mod resource;

pub use database::DatabaseConfiguration;
pub use paths::{DatabasePaths, ResourcePaths};
pub use resource::{HashKind, ResourceConfiguration, StorageKind};
