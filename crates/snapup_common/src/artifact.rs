//! Update artifacts: structural validation, cache probing, integrity.
//!
//! Validation is a plausibility check, not an integrity proof: a real
//! package is at least 1 MiB and carries the expected extension, which
//! filters out error pages and truncated transfers. Integrity, when the
//! server advertises a checksum, is verified separately (sha256_file).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::version::VersionId;

/// Size floor below which a file cannot be a real package
pub const MIN_ARTIFACT_BYTES: u64 = 1024 * 1024;

/// A completed transfer's local payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

impl Artifact {
    /// Builds an artifact from an on-disk file, capturing its size.
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size_bytes: meta.len(),
        })
    }

    /// Artifact from already-known parts (tests, fakes).
    pub fn from_parts(path: PathBuf, size_bytes: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            size_bytes,
        }
    }
}

/// Structural plausibility rules for an installable artifact
#[derive(Debug, Clone)]
pub struct ArtifactPolicy {
    pub min_bytes: u64,
    pub extension: String,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self {
            min_bytes: MIN_ARTIFACT_BYTES,
            extension: ".apk".to_string(),
        }
    }
}

impl ArtifactPolicy {
    /// Necessary-not-sufficient check; returns a verdict, never an
    /// error. The caller decides whether to abort or re-acquire.
    pub fn validate(&self, artifact: &Artifact) -> bool {
        let ok = artifact.size_bytes >= self.min_bytes
            && artifact.file_name.ends_with(&self.extension);
        debug!(
            "📦 Artifact check: {} ({} bytes) valid={}",
            artifact.file_name, artifact.size_bytes, ok
        );
        ok
    }
}

/// Canonical cache file name for a target version, e.g. `snapup-v1.2.apk`.
pub fn artifact_file_name(prefix: &str, version: &VersionId, extension: &str) -> String {
    format!("{prefix}{version}{extension}")
}

/// Probes the download directory for a previously acquired artifact of
/// the target version. Only a validator-passing file counts as a hit.
pub fn find_cached(
    dir: &Path,
    prefix: &str,
    version: &VersionId,
    policy: &ArtifactPolicy,
) -> Option<Artifact> {
    let candidate = dir.join(artifact_file_name(prefix, version, &policy.extension));
    if !candidate.is_file() {
        return None;
    }
    match Artifact::from_path(&candidate) {
        Ok(artifact) if policy.validate(&artifact) => Some(artifact),
        Ok(artifact) => {
            debug!(
                "Cached file {} fails validation, ignoring",
                artifact.file_name
            );
            None
        }
        Err(e) => {
            debug!("Cached candidate unreadable: {e}");
            None
        }
    }
}

/// Streamed SHA-256 of a file, rendered lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apk(size: u64) -> Artifact {
        Artifact::from_parts(PathBuf::from("/downloads/snapup-v1.1.apk"), size)
    }

    #[test]
    fn test_size_floor_boundaries() {
        let policy = ArtifactPolicy::default();
        assert!(!policy.validate(&apk(MIN_ARTIFACT_BYTES - 1)));
        assert!(policy.validate(&apk(MIN_ARTIFACT_BYTES)));
        assert!(policy.validate(&apk(MIN_ARTIFACT_BYTES + 1)));
    }

    #[test]
    fn test_wrong_extension_rejected() {
        let policy = ArtifactPolicy::default();
        let artifact =
            Artifact::from_parts(PathBuf::from("/downloads/snapup-v1.1.zip"), 5 * 1024 * 1024);
        assert!(!policy.validate(&artifact));
    }

    #[test]
    fn test_artifact_file_name() {
        let v = VersionId::new(1, 3);
        assert_eq!(artifact_file_name("snapup-v", &v, ".apk"), "snapup-v1.3.apk");
    }

    #[test]
    fn test_find_cached_requires_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy = ArtifactPolicy::default();
        let version = VersionId::new(1, 2);

        // Nothing on disk: miss.
        assert!(find_cached(dir.path(), "snapup-v", &version, &policy).is_none());

        // Too small to be a package: still a miss.
        let path = dir.path().join("snapup-v1.2.apk");
        fs::write(&path, vec![0u8; 1024]).unwrap();
        assert!(find_cached(dir.path(), "snapup-v", &version, &policy).is_none());

        // A plausible package: hit.
        fs::write(&path, vec![0u8; MIN_ARTIFACT_BYTES as usize]).unwrap();
        let hit = find_cached(dir.path(), "snapup-v", &version, &policy).unwrap();
        assert_eq!(hit.file_name, "snapup-v1.2.apk");
        assert_eq!(hit.size_bytes, MIN_ARTIFACT_BYTES);
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        fs::write(&path, b"snapup").unwrap();

        let digest = sha256_file(&path).unwrap();
        assert_eq!(digest.len(), 64);
        // Stable across reads
        assert_eq!(digest, sha256_file(&path).unwrap());
    }
}
