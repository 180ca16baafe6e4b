use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::access::manager::Environment;
use crate::access::{Database, User};
use crate::config::DatabaseConfiguration;
use crate::error::Result;
use crate::node::{DeweyId, Node};

/// Closed enumeration of the supported data-model flavors. The flavors
/// differ only in which document-root node an empty resource starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Xml,
    Json,
}

impl DatabaseType {
    /// Short tag used in configuration serialization.
    pub fn string_type(self) -> &'static str {
        match self {
            DatabaseType::Xml => "xml",
            DatabaseType::Json => "json",
        }
    }

    /// Reverse lookup of [`string_type`](Self::string_type).
    pub fn from_string(tag: &str) -> Option<DatabaseType> {
        match tag {
            "xml" => Some(DatabaseType::Xml),
            "json" => Some(DatabaseType::Json),
            _ => None,
        }
    }

    /// Document-root node for an empty resource of this flavor.
    pub fn document_node(self, dewey_id: Option<DeweyId>) -> Node {
        match self {
            DatabaseType::Xml => Node::xml_document_root(dewey_id),
            DatabaseType::Json => Node::json_document_root(dewey_id),
        }
    }

    /// Builds the database handle for this flavor and registers it in the
    /// environment's database-sessions pool.
    pub fn create_database(
        self,
        config: DatabaseConfiguration,
        user: User,
        env: &Environment,
    ) -> Result<Arc<Database>> {
        debug_assert_eq!(config.database_type, self);
        Database::new(
            config,
            user,
            Arc::clone(env.databases()),
            Arc::clone(env.sessions()),
            Arc::clone(env.write_locks()),
        )
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.string_type())
    }
}
