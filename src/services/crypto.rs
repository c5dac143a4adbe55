// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Symmetric encryption of stored iCloud passwords.
//!
//! AES-256-GCM with a key derived once at startup from `ENCRYPTION_KEY`
//! via HKDF-SHA256. Every blob is bound to its owner through the AAD, so a
//! blob copied into another user's row will not decrypt.
//!
//! Blob layout: `version (1) || nonce (12) || ciphertext || tag (16)`.

use crate::error::AppError;
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

const BLOB_VERSION: u8 = 1;
const HKDF_SALT: &[u8] = b"reminders-relay/v1";
const HKDF_INFO: &[u8] = b"credential-encryption";

/// Credential cipher shared by the auth service.
#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Derive the AEAD key from the configured secret.
    pub fn new(secret: &[u8]) -> Result<Self, AppError> {
        let mut okm = [0u8; 32];
        Hkdf::<Sha256>::new(Some(HKDF_SALT), secret)
            .expand(HKDF_INFO, &mut okm)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HKDF expand failed: {}", e)))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &okm)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid AES-256-GCM key")))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` for the given owner.
    pub fn encrypt(&self, plaintext: &str, owner: &str) -> Result<Vec<u8>, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Nonce generation failed")))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad(owner)),
                &mut in_out,
            )
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Encryption failed")))?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt) for the same owner.
    pub fn decrypt(&self, blob: &[u8], owner: &str) -> Result<String, AppError> {
        let tag_len = AES_256_GCM.tag_len();
        if blob.len() < 1 + NONCE_LEN + tag_len || blob[0] != BLOB_VERSION {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Malformed credential blob"
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&blob[1..1 + NONCE_LEN]);

        let mut in_out = blob[1 + NONCE_LEN..].to_vec();
        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad(owner)),
                &mut in_out,
            )
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Credential decryption failed")))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

fn aad(owner: &str) -> Vec<u8> {
    format!("username:{}", owner).into_bytes()
}
