// src/crypto/hash.rs

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::Result;

/// Compute the hex SHA-256 digest of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let hash = format!("{:x}", hasher.finalize());
    debug!(path = ?path, hash = %hash, "computed local file hash");
    Ok(hash)
}

pub fn compute_bytes_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Extract the digest from `sha256sum` output (`<hex>  <path>`).
///
/// Returns `None` unless the first field looks like a SHA-256 hex digest.
pub fn parse_sha256sum_output(output: &str) -> Option<String> {
    let digest = output.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_lowercase())
    } else {
        None
    }
}
