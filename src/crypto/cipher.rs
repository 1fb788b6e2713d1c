// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated encryption of file content at rest.
//!
//! ## Blob layout
//!
//! ```text
//! [version: 1 byte][nonce: 24 bytes][ciphertext || tag: n + 16 bytes]
//! ```
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce per blob, so the same
//! plaintext never produces the same ciphertext. The single process-wide
//! key lives in a hex-encoded key file created on first start.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{CryptoError, CryptoResult};

pub const BLOB_VERSION: u8 = 1;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

/// 256-bit key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
    fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let decoded = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|_| CryptoError::KeyMaterial("key file is not valid hex".into()))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(CryptoError::KeyMaterial(format!(
                "expected {KEY_LEN} key bytes, found {}",
                decoded.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&decoded);
        Ok(Self(key))
    }
}

/// Symmetric file cipher holding the process-wide key.
pub struct FileCipher {
    key: KeyMaterial,
}

impl std::fmt::Debug for FileCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCipher").finish_non_exhaustive()
    }
}

impl FileCipher {
    /// Cipher with a fresh random key that is never persisted.
    pub fn ephemeral() -> Self {
        Self {
            key: KeyMaterial::generate(),
        }
    }

    /// Load the key file, or create it with a fresh key if it does not exist.
    ///
    /// A key file that exists but cannot be parsed is an error and is left
    /// untouched: replacing it would make every stored blob unreadable.
    pub fn load_or_generate(path: &Path) -> CryptoResult<Self> {
        match fs::read_to_string(path) {
            Ok(encoded) => {
                let key = KeyMaterial::from_hex(&Zeroizing::new(encoded))?;
                tracing::info!(path = %path.display(), "loaded file encryption key");
                Ok(Self { key })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = KeyMaterial::generate();
                write_key_file(path, &key)?;
                tracing::warn!(
                    path = %path.display(),
                    "generated new file encryption key; back it up, stored files cannot be recovered without it"
                );
                Ok(Self { key })
            }
            Err(e) => Err(CryptoError::Io(e)),
        }
    }

    /// Encrypt file content into a self-describing blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.key.0).map_err(|_| CryptoError::Encryption)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + sealed.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`FileCipher::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if blob.len() < HEADER_LEN + TAG_LEN || blob[0] != BLOB_VERSION {
            return Err(CryptoError::Decryption);
        }
        let (nonce, sealed) = blob[1..].split_at(NONCE_LEN);

        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.key.0).map_err(|_| CryptoError::Decryption)?;
        cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decryption)
    }
}

fn write_key_file(path: &Path, key: &KeyMaterial) -> CryptoResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let encoded = Zeroizing::new(hex::encode(key.0));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(encoded.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
