// src/crypto/mod.rs

//! Content hashing and symmetric encryption.
//!
//! - [`hash`] computes the SHA-256 digests used to verify file transfers
//!   against `sha256sum` on the remote side.
//! - [`cipher`] encrypts stored host credentials with AES-256-GCM.

pub mod cipher;
pub mod hash;

pub use cipher::{reveal, Cipher, ENCRYPTED_PREFIX, SECRET_KEY_ENV};
pub use hash::{compute_bytes_hash, compute_file_hash, parse_sha256sum_output};
