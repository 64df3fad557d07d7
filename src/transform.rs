//! # Blob Transforms
//!
//! Songs may be stored compressed, encrypted, or both. The stored bytes are
//! produced as `encrypt(compress(source))` and restored in the reverse order.
//!
//! - Compression is zlib.
//! - Encryption is XChaCha20-Poly1305. The key is the SHA-256 of the
//!   passphrase; every blob carries its own random 24-byte nonce in front of
//!   the ciphertext.
//!
//! The catalog records which transforms were applied to each song, and a play
//! session only selects songs whose flags match its own pipeline.

use crate::config::JukeboxOptions;
use crate::error::JukeboxError;
use anyhow::{Context, Result};
use chacha20poly1305::aead::{Aead, OsRng};
use chacha20poly1305::{AeadCore, KeyInit, XChaCha20Poly1305, XNonce};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};

const NONCE_SIZE: usize = 24;

/// The transforms configured for this invocation.
#[derive(Clone, Default)]
pub struct Pipeline {
    compress: bool,
    cipher: Option<XChaCha20Poly1305>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("compress", &self.compress)
            .field("encrypt", &self.cipher.is_some())
            .finish()
    }
}

impl Pipeline {
    pub fn new(compress: bool, passphrase: Option<&str>) -> Self {
        let cipher = passphrase.map(|phrase| {
            let key = Sha256::digest(phrase.as_bytes());
            XChaCha20Poly1305::new(&key)
        });
        Self { compress, cipher }
    }

    /// Build the pipeline from the command-line options.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::ConfigInvalid`] when encryption is on but no key can be
    /// resolved.
    pub fn from_options(options: &JukeboxOptions) -> Result<Self> {
        if !options.use_encryption {
            return Ok(Self::new(options.use_compression, None));
        }
        let key = options.resolve_encryption_key()?.ok_or_else(|| {
            JukeboxError::ConfigInvalid("--encrypt requires --key or --keyfile".to_string())
        })?;
        Ok(Self::new(options.use_compression, Some(&key)))
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    pub fn encrypts(&self) -> bool {
        self.cipher.is_some()
    }

    /// True when stored bytes equal source bytes.
    pub fn is_identity(&self) -> bool {
        !self.compresses() && !self.encrypts()
    }

    /// Source bytes to stored bytes.
    pub fn encode(&self, source: &[u8]) -> Result<Vec<u8>> {
        let mut data = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(source).context("Compression failed")?;
            encoder.finish().context("Compression failed")?
        } else {
            source.to_vec()
        };

        if let Some(cipher) = &self.cipher {
            let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
            let ciphertext = cipher
                .encrypt(&nonce, data.as_slice())
                .map_err(|e| anyhow::anyhow!("Encryption failed: {e}"))?;
            let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            sealed.extend_from_slice(nonce.as_slice());
            sealed.extend_from_slice(&ciphertext);
            data = sealed;
        }

        Ok(data)
    }

    /// Stored bytes back to source bytes.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::CorruptDownload`] when authentication or decompression
    /// fails.
    pub fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        let mut data = match &self.cipher {
            Some(cipher) => {
                if stored.len() < NONCE_SIZE {
                    return Err(JukeboxError::CorruptDownload(
                        "ciphertext too short for nonce".to_string(),
                    )
                    .into());
                }
                let (nonce, ciphertext) = stored.split_at(NONCE_SIZE);
                cipher
                    .decrypt(XNonce::from_slice(nonce), ciphertext)
                    .map_err(|_| {
                        JukeboxError::CorruptDownload("decryption failed".to_string())
                    })?
            }
            None => stored.to_vec(),
        };

        if self.compress {
            let mut decoded = Vec::new();
            ZlibDecoder::new(data.as_slice())
                .read_to_end(&mut decoded)
                .map_err(|e| JukeboxError::CorruptDownload(format!("decompression failed: {e}")))?;
            data = decoded;
        }

        Ok(data)
    }
}
