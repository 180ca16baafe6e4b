// ArborDB - embeddable versioned storage engine for tree-structured
// XML and JSON documents.
// Core library module

pub mod access;
pub mod buffer;
pub mod config;
pub mod crypto;
pub mod error;
pub mod io;
pub mod node;
pub mod page;
pub mod storage;
pub mod trx;
pub mod utils;

pub use access::{
    create_database, default_environment, exists_database, open_database, truncate_database,
    Database, DatabaseType, Environment, User,
};
pub use config::{DatabaseConfiguration, HashKind, ResourceConfiguration, StorageKind};
pub use error::{DbError, Result};
pub use node::{DeweyId, Node, NodeKind};
pub use trx::{NodeReadTrx, NodeWriteTrx, ResourceSession, Session};
