//! # Checksum Verifier
//!
//! Streaming SHA-256 digests for backup artifacts. Files are read in fixed
//! size chunks so arbitrarily large dumps never have to fit in memory.

use std::path::Path;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Computes and compares artifact digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase hex SHA-256 of the file at `path`.
    pub async fn digest(&self, path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_BYTES];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Recompute the digest and compare it with `expected`.
    ///
    /// Returns `false` when the file cannot be read, so an unreadable artifact
    /// is treated as an integrity failure by callers.
    pub async fn verify(&self, path: &Path, expected: &str) -> bool {
        match self.digest(path).await {
            Ok(actual) => digests_match(&actual, expected),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Checksum verification could not read artifact"
                );
                false
            }
        }
    }
}

fn digests_match(actual: &str, expected: &str) -> bool {
    let expected = expected.trim().to_ascii_lowercase();
    if actual.len() != expected.len() {
        return false;
    }
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn digest_is_deterministic_and_known() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.dump");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let verifier = ChecksumVerifier::new();
        let first = verifier.digest(&path).await.unwrap();
        let second = verifier.digest(&path).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn digest_streams_files_larger_than_the_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let payload: Vec<u8> = (0..(READ_BUFFER_BYTES * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        tokio::fs::write(&path, &payload).await.unwrap();

        let expected = hex::encode(Sha256::digest(&payload));
        assert_eq!(ChecksumVerifier::new().digest(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn verify_matches_only_the_recomputed_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.dump");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let verifier = ChecksumVerifier::new();
        let digest = verifier.digest(&path).await.unwrap();

        assert!(verifier.verify(&path, &digest).await);
        assert!(verifier.verify(&path, &digest.to_uppercase()).await);
        assert!(!verifier.verify(&path, "abc123").await);

        tokio::fs::write(&path, b"tampered").await.unwrap();
        assert!(!verifier.verify(&path, &digest).await);
    }

    #[tokio::test]
    async fn verify_returns_false_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.dump");

        assert!(!ChecksumVerifier::new().verify(&missing, "abc123").await);
    }
}
