use sha2::{Digest, Sha256};

/// Content checksum recorded for an applied migration, `sha256:<hex>`.
/// Computed over the file as it is on disk, before schema rewriting, so the
/// same file yields the same checksum in every target schema.
pub fn checksum(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}
