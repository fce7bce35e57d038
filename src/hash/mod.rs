// Hashing module using BLAKE3
//
// Two digests live here:
// - identity: derived from the canonical relative path, the catalog's primary key
// - content fingerprint: bounded-prefix digest used as a duplicate hint

use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::constants::{
    FINGERPRINT_READ_CHUNK, FINGERPRINT_SCHEME, IDENTITY_SCHEME, PATH_DB_SEPARATOR,
};
use crate::error::{VidshelfError, Result};

/// Normalize a relative path to the catalog form: forward slashes,
/// no leading "./" or separator, no empty segments. Only the platform's
/// separators split segments; on Unix a backslash is part of a file name.
pub fn canonical_relative_path(relative_path: &str) -> String {
    relative_path
        .split(std::path::is_separator)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join(&PATH_DB_SEPARATOR.to_string())
}

/// Compute the identity for a path relative to the watched root.
/// Output is a 64-char hex BLAKE3 digest; equal paths always map to equal identities.
pub fn compute_identity(relative_path: &str) -> String {
    let canonical = canonical_relative_path(relative_path);

    let mut hasher = blake3::Hasher::new();
    hasher.update(IDENTITY_SCHEME.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(canonical.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Compute the content fingerprint over at most `budget` leading bytes.
/// Format: "blake3:prefix_v1:<hash>"
pub fn compute_content_fingerprint(path: &Path, budget: u64) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| VidshelfError::Hash(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut reader = file.take(budget);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; FINGERPRINT_READ_CHUNK];

    loop {
        let bytes_read = reader.read(&mut buffer)
            .map_err(|e| VidshelfError::Hash(format!("Failed to read {}: {}", path.display(), e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("blake3:{}:{}", FINGERPRINT_SCHEME, hash.to_hex()))
}
