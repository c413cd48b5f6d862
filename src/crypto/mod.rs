// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # At-Rest Encryption
//!
//! Everything this crate writes to origin storage (tokens, the offline queue)
//! passes through [`CredentialCipher`] first.
//!
//! ## Blob Format (`v1`)
//!
//! ```text
//! v1$<salt b64>$<iv b64>$<ciphertext+tag b64>
//! ```
//!
//! - Key: PBKDF2-HMAC-SHA256, 100 000 iterations, 16-byte random salt per blob
//! - Cipher: AES-256-GCM, 96-bit random nonce per blob, version tag as AAD
//!
//! The version tag pins both the KDF and the cipher parameters. A future `v2`
//! adds a new arm to [`EncryptedBlob::parse`] and to the decrypt path; `v1`
//! blobs keep decrypting unchanged.

pub mod cipher;

pub use cipher::{CipherError, CredentialCipher, EncryptedBlob, MasterSecret, BLOB_VERSION_V1};
