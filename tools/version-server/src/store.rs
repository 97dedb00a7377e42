//! File-backed version store.
//!
//! Versions live in versions.json keyed by version name; operation
//! counters live in stats.json. The newest version is the one with the
//! highest version code.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// One published version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version_code: u32,
    pub version_name: String,
    pub release_notes: String,
    pub download_url: String,
    #[serde(default)]
    pub is_force_update: bool,
    pub created_at: String,
    /// Artifact checksum, when the publisher provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

pub struct VersionStore {
    versions_file: PathBuf,
    stats_file: PathBuf,
    /// Base URL artifact download links are derived from
    artifact_base_url: String,
}

impl VersionStore {
    pub fn open(data_dir: &Path, artifact_base_url: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;

        let store = Self {
            versions_file: data_dir.join("versions.json"),
            stats_file: data_dir.join("stats.json"),
            artifact_base_url: artifact_base_url.trim_end_matches('/').to_string(),
        };

        if !store.versions_file.exists() {
            store.seed_demo_versions()?;
            info!("Version store seeded with demo versions");
        }

        Ok(store)
    }

    fn download_url_for(&self, version_name: &str) -> String {
        format!("{}/snapup-v{version_name}.apk", self.artifact_base_url)
    }

    /// First-boot content mirroring a small release history.
    fn seed_demo_versions(&self) -> Result<()> {
        let seeds = [
            ("1.0", 1, "Initial release with basic update functionality", false),
            ("1.1", 2, "Enhanced status reporting and cache reuse", false),
            ("1.2", 3, "Added auto-installation and improved performance", true),
        ];

        let mut versions = BTreeMap::new();
        for (name, code, notes, force) in seeds {
            versions.insert(
                name.to_string(),
                VersionRecord {
                    version_code: code,
                    version_name: name.to_string(),
                    release_notes: notes.to_string(),
                    download_url: self.download_url_for(name),
                    is_force_update: force,
                    created_at: chrono::Utc::now().to_rfc3339(),
                    sha256: None,
                },
            );
        }
        self.save_versions(&versions)
    }

    fn load_versions(&self) -> Result<BTreeMap<String, VersionRecord>> {
        if !self.versions_file.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.versions_file)?;
        serde_json::from_str(&content).context("versions.json is corrupt")
    }

    fn save_versions(&self, versions: &BTreeMap<String, VersionRecord>) -> Result<()> {
        let content = serde_json::to_string_pretty(versions)?;
        fs::write(&self.versions_file, content)?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<VersionRecord>> {
        Ok(self.load_versions()?.into_values().collect())
    }

    /// The version with the highest code, if any are published.
    pub fn latest(&self) -> Result<Option<VersionRecord>> {
        Ok(self
            .all()?
            .into_iter()
            .max_by_key(|v| v.version_code))
    }

    pub fn next_version_code(&self) -> Result<u32> {
        Ok(self.latest()?.map(|v| v.version_code + 1).unwrap_or(1))
    }

    /// Publish a new version; the download link is derived from the
    /// configured artifact base.
    pub fn add_version(
        &self,
        version_name: &str,
        release_notes: &str,
        is_force_update: bool,
    ) -> Result<VersionRecord> {
        let mut versions = self.load_versions()?;
        let record = VersionRecord {
            version_code: self.next_version_code()?,
            version_name: version_name.to_string(),
            release_notes: release_notes.to_string(),
            download_url: self.download_url_for(version_name),
            is_force_update,
            created_at: chrono::Utc::now().to_rfc3339(),
            sha256: None,
        };
        versions.insert(version_name.to_string(), record.clone());
        self.save_versions(&versions)?;
        self.increment_stat("versions_created")?;
        info!("Published version {version_name} (code {})", record.version_code);
        Ok(record)
    }

    /// Reset history to exactly one base version with code 1.
    pub fn reset_to(&self, version_name: &str, release_notes: &str) -> Result<VersionRecord> {
        let record = VersionRecord {
            version_code: 1,
            version_name: version_name.to_string(),
            release_notes: release_notes.to_string(),
            download_url: self.download_url_for(version_name),
            is_force_update: false,
            created_at: chrono::Utc::now().to_rfc3339(),
            sha256: None,
        };

        let mut versions = BTreeMap::new();
        versions.insert(version_name.to_string(), record.clone());
        self.save_versions(&versions)?;
        self.increment_stat("versions_reset")?;
        info!("Version history reset to {version_name}");
        Ok(record)
    }

    pub fn stats(&self) -> Result<Value> {
        if self.stats_file.exists() {
            let content = fs::read_to_string(&self.stats_file)?;
            return serde_json::from_str(&content).context("stats.json is corrupt");
        }
        Ok(serde_json::json!({
            "total_versions": self.all()?.len(),
            "versions_created": 0,
            "versions_reset": 0,
            "last_updated": chrono::Utc::now().to_rfc3339(),
        }))
    }

    fn increment_stat(&self, name: &str) -> Result<()> {
        let mut stats = self.stats()?;
        let counter = stats
            .get(name)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        stats[name] = Value::from(counter + 1);
        stats["total_versions"] = Value::from(self.all()?.len());
        stats["last_updated"] = Value::from(chrono::Utc::now().to_rfc3339());
        fs::write(&self.stats_file, serde_json::to_string_pretty(&stats)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> VersionStore {
        VersionStore::open(dir, "http://artifacts.example/packages").unwrap()
    }

    #[test]
    fn test_seeds_demo_versions_once() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());

        let latest = s.latest().unwrap().unwrap();
        assert_eq!(latest.version_name, "1.2");
        assert_eq!(latest.version_code, 3);
        assert_eq!(s.all().unwrap().len(), 3);

        // Reopening must not reseed over existing data.
        s.reset_to("1.0", "reset").unwrap();
        let s = store(dir.path());
        assert_eq!(s.all().unwrap().len(), 1);
    }

    #[test]
    fn test_add_version_bumps_code_and_derives_url() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());

        let record = s.add_version("1.3", "notes", false).unwrap();
        assert_eq!(record.version_code, 4);
        assert_eq!(
            record.download_url,
            "http://artifacts.example/packages/snapup-v1.3.apk"
        );
        assert_eq!(s.latest().unwrap().unwrap().version_name, "1.3");
    }

    #[test]
    fn test_reset_clears_history() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());

        s.add_version("1.3", "notes", false).unwrap();
        let record = s.reset_to("1.0", "fresh cycle").unwrap();

        assert_eq!(record.version_code, 1);
        assert_eq!(s.all().unwrap().len(), 1);
        assert_eq!(s.latest().unwrap().unwrap().version_name, "1.0");
    }

    #[test]
    fn test_stats_counters() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());

        s.add_version("1.3", "", false).unwrap();
        s.add_version("1.4", "", false).unwrap();
        s.reset_to("1.0", "").unwrap();

        let stats = s.stats().unwrap();
        assert_eq!(stats["versions_created"], 2);
        assert_eq!(stats["versions_reset"], 1);
        assert_eq!(stats["total_versions"], 1);
    }
}
