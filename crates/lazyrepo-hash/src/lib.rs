//! Content hashing for manifests.
//!
//! One algorithm, SHA-256 rendered as lowercase hex, is used for every hash
//! the runner records: file contents, env-var values, and the rolling
//! aggregate over a manifest's serialized lines. Using a single algorithm
//! keeps manifests self-consistent and diffable across versions.

use std::io;

use lazyrepo_paths::AbsoluteSystemPath;
use sha2::{Digest, Sha256};

/// Hex digest width in characters (SHA-256).
pub const DIGEST_WIDTH: usize = 64;

pub fn hash_string(value: impl AsRef<[u8]>) -> String {
    let mut digest = Sha256::new();
    digest.update(value.as_ref());
    hex::encode(digest.finalize())
}

/// Hashes a file's contents by streaming it through the digest, so large
/// build outputs never need to fit in memory.
pub fn hash_file(path: &AbsoluteSystemPath) -> Result<String, io::Error> {
    let mut file = path.open_file()?;
    let mut digest = Sha256::new();
    io::copy(&mut file, &mut digest)?;
    Ok(hex::encode(digest.finalize()))
}

/// Rolling hash over a manifest's serialized lines in write order.
#[derive(Default)]
pub struct AggregateHasher {
    digest: Sha256,
}

impl AggregateHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_line(&mut self, line: &str) {
        self.digest.update(line.as_bytes());
    }

    pub fn finish(self) -> String {
        hex::encode(self.digest.finalize())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            hash_string(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_string("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_width() {
        assert_eq!(hash_string("anything").len(), DIGEST_WIDTH);
    }

    #[test]
    fn test_file_hash_matches_string_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"file contents\n").unwrap();
        let path = lazyrepo_paths::AbsoluteSystemPathBuf::try_from(path).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_string("file contents\n"));
    }

    #[test]
    fn test_aggregate_is_hash_of_concatenation() {
        let mut aggregate = AggregateHasher::new();
        aggregate.update_line("file\ta.txt\tdeadbeef\n");
        aggregate.update_line("file\tb.txt\tfeedface\n");
        assert_eq!(
            aggregate.finish(),
            hash_string("file\ta.txt\tdeadbeef\nfile\tb.txt\tfeedface\n")
        );
    }
}
