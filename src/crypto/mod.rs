// Key management for encrypted resources.
//
// The key set is generated when a resource is created with encryption
// enabled and persisted as cleartext JSON inside the resource directory
// (`encryptionKey.json`); protecting that directory is the embedder's
// deployment concern.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(rename = "keyId")]
    pub key_id: u32,
    /// Base64-encoded 256-bit key material.
    #[serde(rename = "keyMaterial")]
    pub key_material: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// A set of keys for one resource; `primary_key_id` selects the key used
/// for new frames, older entries remain readable after rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(rename = "primaryKeyId")]
    pub primary_key_id: u32,
    pub keys: Vec<KeyEntry>,
}

impl KeySet {
    /// Generates a fresh single-key set.
    pub fn generate() -> Self {
        let mut material = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut material);
        KeySet {
            primary_key_id: 1,
            keys: vec![KeyEntry {
                key_id: 1,
                key_material: BASE64.encode(material),
                created_at: chrono::Utc::now().timestamp_millis(),
            }],
        }
    }

    /// Raw bytes of the primary key.
    pub fn primary_key(&self) -> Result<Vec<u8>> {
        let entry = self
            .keys
            .iter()
            .find(|k| k.key_id == self.primary_key_id)
            .ok_or_else(|| {
                DbError::Encryption(format!(
                    "primary key {} missing from key set",
                    self.primary_key_id
                ))
            })?;
        let material = BASE64
            .decode(&entry.key_material)
            .map_err(|e| DbError::Encryption(format!("malformed key material: {e}")))?;
        if material.len() != KEY_LEN {
            return Err(DbError::Encryption(format!(
                "key {} has {} bytes, expected {KEY_LEN}",
                entry.key_id,
                material.len()
            )));
        }
        Ok(material)
    }

    pub fn persist(&self, file: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(file, json)?;
        Ok(())
    }

    pub fn load(file: &Path) -> Result<Self> {
        let raw = fs::read_to_string(file)
            .map_err(|e| DbError::Encryption(format!("cannot read {}: {e}", file.display())))?;
        let key_set = serde_json::from_str(&raw)
            .map_err(|e| DbError::Encryption(format!("malformed {}: {e}", file.display())))?;
        Ok(key_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique_and_well_sized() {
        let a = KeySet::generate();
        let b = KeySet::generate();
        assert_eq!(a.primary_key().unwrap().len(), KEY_LEN);
        assert_ne!(a.primary_key().unwrap(), b.primary_key().unwrap());
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("encryptionKey.json");
        let key_set = KeySet::generate();
        key_set.persist(&file).unwrap();

        let loaded = KeySet::load(&file).unwrap();
        assert_eq!(loaded.primary_key_id, key_set.primary_key_id);
        assert_eq!(loaded.primary_key().unwrap(), key_set.primary_key().unwrap());
    }

    #[test]
    fn missing_primary_key_is_reported() {
        let mut key_set = KeySet::generate();
        key_set.primary_key_id = 42;
        assert!(matches!(
            key_set.primary_key(),
            Err(DbError::Encryption(_))
        ));
    }
}
