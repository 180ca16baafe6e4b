use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity recorded as the author of every revision a session commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub id: Uuid,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
        }
    }
}

impl Default for User {
    fn default() -> Self {
        User::new("admin")
    }
}
