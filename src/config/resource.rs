// Per-resource configuration, serialized to `<resource>/settings.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::DatabaseType;
use crate::config::paths::ResourcePaths;
use crate::error::{DbError, Result};

/// Storage backend kind for a resource.
///
/// Both kinds currently perform file I/O; the kind additionally selects the
/// buffer-cache sizing profile (memory-mapped backings tolerate far larger
/// caches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageKind {
    File,
    MemoryMapped,
}

/// Node hashing policy for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HashKind {
    /// No hashes are maintained.
    None,
    /// Ancestor hashes are updated incrementally on every structural change.
    Rolling,
    /// Hashes are recomputed bottom-up at commit time.
    Postorder,
}

/// Configuration of one resource. Immutable after construction; the
/// resource ID is assigned by the owning database during `create_resource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfiguration {
    /// Runtime location (`<db>/data/<name>`); not serialized.
    #[serde(skip)]
    pub path: PathBuf,

    pub name: String,

    #[serde(rename = "resourceID")]
    pub resource_id: u64,

    #[serde(rename = "databaseType")]
    pub database_type: DatabaseType,

    #[serde(rename = "storageKind")]
    pub storage_kind: StorageKind,

    /// Deflate compression in the byte-handler pipeline.
    #[serde(rename = "useDeflate")]
    pub use_deflate: bool,

    /// AES-GCM encryption in the byte-handler pipeline.
    #[serde(rename = "useEncryption")]
    pub use_encryption: bool,

    #[serde(rename = "hashKind")]
    pub hash_kind: HashKind,

    /// When set, commit timestamps may be supplied by the committer and the
    /// bootstrap revision is stamped with epoch 0 for determinism.
    #[serde(rename = "customCommitTimestamps")]
    pub custom_commit_timestamps: bool,
}

impl ResourceConfiguration {
    /// A file-backed, deflate-compressed, unencrypted, rolling-hashed
    /// resource; the common default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            name: name.into(),
            resource_id: 0,
            database_type: DatabaseType::Xml,
            storage_kind: StorageKind::File,
            use_deflate: true,
            use_encryption: false,
            hash_kind: HashKind::Rolling,
            custom_commit_timestamps: false,
        }
    }

    pub fn with_storage_kind(mut self, kind: StorageKind) -> Self {
        self.storage_kind = kind;
        self
    }

    pub fn with_deflate(mut self, on: bool) -> Self {
        self.use_deflate = on;
        self
    }

    pub fn with_encryption(mut self, on: bool) -> Self {
        self.use_encryption = on;
        self
    }

    pub fn with_hash_kind(mut self, kind: HashKind) -> Self {
        self.hash_kind = kind;
        self
    }

    pub fn with_custom_commit_timestamps(mut self, on: bool) -> Self {
        self.custom_commit_timestamps = on;
        self
    }

    /// Writes `settings.json` under the resource directory.
    pub fn serialize(&self) -> Result<()> {
        let file = ResourcePaths::Settings.path(&self.path);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(file, json)?;
        Ok(())
    }

    /// Reads `settings.json` for the resource at `resource_path`.
    pub fn deserialize(resource_path: &Path) -> Result<Self> {
        let file = ResourcePaths::Settings.path(resource_path);
        let raw = fs::read_to_string(&file).map_err(|e| {
            DbError::Config(format!("cannot read {}: {e}", file.display()))
        })?;
        let mut config: ResourceConfiguration = serde_json::from_str(&raw)
            .map_err(|e| DbError::Config(format!("malformed {}: {e}", file.display())))?;
        config.path = resource_path.to_path_buf();
        Ok(config)
    }
}
