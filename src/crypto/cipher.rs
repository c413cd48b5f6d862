// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM with PBKDF2-derived keys.

use std::fmt;
use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Current blob format tag.
pub const BLOB_VERSION_V1: &str = "v1";

const FIELD_SEPARATOR: char = '$';
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("unsupported blob version: {0}")]
    UnsupportedVersion(String),

    /// Covers tag mismatch, malformed blobs and wrong keys alike.
    #[error("decryption failed")]
    Decrypt,

    #[error("secure random source unavailable")]
    Rng,
}

/// The long-term secret keys are derived from.
///
/// Wiped from memory on drop, never printed.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<Vec<u8>>);

impl MasterSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(***)")
    }
}

/// An encrypted value as stored at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub version: String,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to `<version>$<salt>$<iv>$<ciphertext>`.
    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.version,
            Base64::encode_string(&self.salt),
            Base64::encode_string(&self.iv),
            Base64::encode_string(&self.ciphertext),
            sep = FIELD_SEPARATOR,
        )
    }

    /// Parse the storage representation.
    ///
    /// An unknown version is reported as such; every other defect is a
    /// plain [`CipherError::Decrypt`].
    pub fn parse(raw: &str) -> Result<Self, CipherError> {
        let mut parts = raw.split(FIELD_SEPARATOR);
        let version = parts.next().ok_or(CipherError::Decrypt)?;
        if version != BLOB_VERSION_V1 {
            return Err(CipherError::UnsupportedVersion(version.to_string()));
        }

        let (Some(salt), Some(iv), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Decrypt);
        };

        let decode = |field: &str| Base64::decode_vec(field).map_err(|_| CipherError::Decrypt);
        let blob = Self {
            version: version.to_string(),
            salt: decode(salt)?,
            iv: decode(iv)?,
            ciphertext: decode(ciphertext)?,
        };

        if blob.salt.len() != SALT_LEN || blob.iv.len() != NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        Ok(blob)
    }
}

/// Authenticated symmetric encryption bound to one [`MasterSecret`].
pub struct CredentialCipher {
    secret: MasterSecret,
    rng: SystemRandom,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("version", &BLOB_VERSION_V1)
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(secret: MasterSecret) -> Self {
        Self {
            secret,
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt with a fresh salt and nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob, CipherError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng.fill(&mut salt).map_err(|_| CipherError::Rng)?;
        let mut iv = [0u8; NONCE_LEN];
        self.rng.fill(&mut iv).map_err(|_| CipherError::Rng)?;

        let key = sealing_key(self.secret.expose(), &salt)?;
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::from(BLOB_VERSION_V1.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| CipherError::Rng)?;

        Ok(EncryptedBlob {
            version: BLOB_VERSION_V1.to_string(),
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            ciphertext: in_out,
        })
    }

    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, CipherError> {
        if blob.version != BLOB_VERSION_V1 {
            return Err(CipherError::UnsupportedVersion(blob.version.clone()));
        }

        let key = sealing_key(self.secret.expose(), &blob.salt).map_err(|_| CipherError::Decrypt)?;
        let nonce =
            Nonce::try_assume_unique_for_key(&blob.iv).map_err(|_| CipherError::Decrypt)?;

        let mut in_out = blob.ciphertext.clone();
        let plaintext_len = key
            .open_in_place(nonce, Aad::from(blob.version.as_bytes()), in_out.as_mut_slice())
            .map_err(|_| CipherError::Decrypt)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }

    /// Encrypt and encode in one step.
    pub fn seal_to_string(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        Ok(self.encrypt(plaintext)?.encode())
    }

    /// Parse and decrypt in one step.
    pub fn open_str(&self, raw: &str) -> Result<Vec<u8>, CipherError> {
        self.decrypt(&EncryptedBlob::parse(raw)?)
    }
}

fn sealing_key(secret: &[u8], salt: &[u8]) -> Result<LessSafeKey, CipherError> {
    let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(PBKDF2_ALG, PBKDF2_ITERATIONS, salt, secret, &mut key_bytes[..]);
    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes[..]).map_err(|_| CipherError::Rng)?;
    Ok(LessSafeKey::new(unbound))
}
