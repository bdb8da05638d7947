//! Content hashing for manifest versioning and cache freshness.
//!
//! Two tiers:
//! - `ContentHash` (blake3, 256-bit) for anything that gates correctness:
//!   cache validation and `Manifest.version`.
//! - `compute`/`fingerprint` (FxHash, 64-bit) for filename stamping, where
//!   speed matters and a collision only costs a spurious rebuild.

use std::fs::File;
use std::hash::Hasher;
use std::io::{self, BufReader, Read};
use std::path::Path;

use rustc_hash::FxHasher;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A hash representing "no content" (all zeros). Unreadable sources
    /// hash to this, which never matches a real hash.
    #[inline]
    pub const fn empty() -> Self {
        Self([0; 32])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars for brevity in logs and filenames
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Hash a byte slice with blake3.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}

/// Hash file contents with blake3 (streaming).
///
/// Returns `ContentHash::empty()` if the file cannot be read, so a vanished
/// source always registers as a cache mismatch.
pub fn hash_file(path: &Path) -> ContentHash {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return ContentHash::empty(),
    };

    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ContentHash::empty(),
        }
    }

    ContentHash::new(*hasher.finalize().as_bytes())
}

/// Compute a fast 64-bit hash from byte data.
#[inline]
pub fn compute<T: AsRef<[u8]> + ?Sized>(data: &T) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_ref());
    hasher.finish()
}

/// Compute a fast hash and return it as an 8-char hex fingerprint.
///
/// Used for cache-busting module refs (e.g. `home.a1b2c3d4.js`).
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    format!("{:016x}", compute(value))[..8].to_string()
}

/// Full-width (16-char) fingerprint, for cache filenames derived from keys.
#[inline]
pub fn fingerprint_long<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    format!("{:016x}", compute(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_display() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
    }

    #[test]
    fn test_content_hash_hex_roundtrip() {
        let original = ContentHash::new([0x12; 32]);
        let recovered = ContentHash::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mod.js");
        fs::write(&path, "export const a = 1;").unwrap();

        let hash1 = hash_file(&path);
        let hash2 = hash_file(&path);
        assert_eq!(hash1, hash2);
        assert!(!hash1.is_empty());

        fs::write(&path, "export const a = 2;").unwrap();
        let hash3 = hash_file(&path);
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_hash_file_nonexistent() {
        let hash = hash_file(Path::new("/nonexistent/mod.js"));
        assert!(hash.is_empty());
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 8);
        assert_eq!(fingerprint_long("abc").len(), 16);
    }
}
