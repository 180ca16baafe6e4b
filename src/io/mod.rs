// Byte-handler pipeline applied to every page frame between memory and
// storage: handlers run in order on write and in reverse on read.

use std::io::{Read, Write};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::RngCore;

use crate::config::ResourceConfiguration;
use crate::crypto::KeySet;
use crate::error::{DbError, Result};

/// AES-GCM nonce length prefixed to every encrypted frame.
const NONCE_LEN: usize = 12;

/// One transformation stage of the pipeline.
pub trait ByteHandler: Send + Sync {
    /// Memory → storage direction.
    fn serialize(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Storage → memory direction.
    fn deserialize(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Deflate compression, level 6.
pub struct DeflateHandler {
    level: Compression,
}

impl DeflateHandler {
    pub fn new() -> Self {
        Self {
            level: Compression::new(6),
        }
    }
}

impl Default for DeflateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteHandler for DeflateHandler {
    fn serialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// AES-256-GCM encryption with a fresh random nonce per frame; the nonce is
/// stored in front of the ciphertext.
pub struct AesGcmHandler {
    cipher: Aes256Gcm,
}

impl AesGcmHandler {
    pub fn new(key_set: &KeySet) -> Result<Self> {
        let key = key_set.primary_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| DbError::Encryption(e.to_string()))?;
        Ok(Self { cipher })
    }
}

impl ByteHandler for AesGcmHandler {
    fn serialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|e| DbError::Encryption(e.to_string()))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(DbError::Encryption("frame shorter than nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| DbError::Encryption(e.to_string()))
    }
}

/// Ordered chain of byte handlers shared by all transactions of a resource.
#[derive(Clone)]
pub struct ByteHandlerPipeline {
    handlers: Arc<Vec<Box<dyn ByteHandler>>>,
}

impl ByteHandlerPipeline {
    /// Builds the pipeline mandated by a resource configuration. The key
    /// set must be supplied iff encryption is enabled.
    pub fn for_resource(
        config: &ResourceConfiguration,
        key_set: Option<&KeySet>,
    ) -> Result<Self> {
        let mut handlers: Vec<Box<dyn ByteHandler>> = Vec::new();
        if config.use_deflate {
            handlers.push(Box::new(DeflateHandler::new()));
        }
        if config.use_encryption {
            let key_set = key_set.ok_or_else(|| {
                DbError::Encryption("encryption enabled but no key set loaded".to_string())
            })?;
            handlers.push(Box::new(AesGcmHandler::new(key_set)?));
        }
        Ok(Self {
            handlers: Arc::new(handlers),
        })
    }

    pub fn identity() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    pub fn serialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for handler in self.handlers.iter() {
            current = handler.serialize(&current)?;
        }
        Ok(current)
    }

    pub fn deserialize(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for handler in self.handlers.iter().rev() {
            current = handler.deserialize(&current)?;
        }
        Ok(current)
    }
}
