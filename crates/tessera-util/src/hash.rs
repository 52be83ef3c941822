//! Hashing utilities for content-addressed archives and cache keys.

use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-1 hex digest of a byte slice.
///
/// Used only for the sharded remote repository's `archive_content_hash`
/// column, which is fixed to SHA-1 for wire compatibility with existing
/// rows. New code that is free to choose should prefer [`sha256_bytes`].
pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a file using streaming reads.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, UtilError> {
    let file = std::fs::File::open(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = std::io::Read::read(&mut reader, &mut buf).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break; // unreachable: n is bounded by buf.len()
        };
        hasher.update(chunk);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Combine multiple byte-string parts into a single composite SHA-256 hash.
///
/// Each part is hashed in order with a length prefix, so a sequence of
/// parts hashes to a value distinct from any other way of splitting the
/// same concatenated bytes (`["ab","c"]` hashes differently from
/// `["a","bc"]`).
pub fn sha256_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        let len_bytes = part.len().to_le_bytes();
        hasher.update(len_bytes);
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Hash a set of named entries in stable (sorted-by-name) order.
///
/// Each entry contributes its name and its bytes, both length-prefixed, so
/// the result is a deterministic content hash regardless of the order the
/// caller enumerated entries in. This is the basis for an archive's
/// content-addressable identity.
pub fn sha256_entries<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut sorted: Vec<(&str, &[u8])> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, bytes) in sorted {
        let name_bytes = name.as_bytes();
        hasher.update(name_bytes.len().to_le_bytes());
        hasher.update(name_bytes);
        hasher.update(bytes.len().to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}
