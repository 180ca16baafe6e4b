// Access and session management: database lifecycle, resource lifecycle
// and the registries that coordinate many readers with one writer per
// resource.

pub mod buffers;
pub mod database;
pub mod database_type;
pub mod manager;
pub mod path_pool;
pub mod resource_store;
pub mod user;
pub mod write_locks;

pub use buffers::BufferManagerMap;
pub use database::Database;
pub use database_type::DatabaseType;
pub use manager::{
    create_database, default_environment, exists_database, open_database, truncate_database,
    Environment,
};
pub use path_pool::PathBasedPool;
pub use resource_store::ResourceStore;
pub use user::User;
pub use write_locks::WriteLocksRegistry;
