//! Version metadata API: wire types and HTTP client.
//!
//! The version server speaks camelCase JSON. `/update` answers 200 for
//! both outcomes: a full update payload when a newer version exists,
//! or a no-update message echoing the versions involved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, UpdateError};

const USER_AGENT: &str = concat!("snapup/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Answer to an update check. Either the update fields are all present
/// (an update exists) or `message`/`latest_version` describe why not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub is_force_update: bool,
    /// Hex SHA-256 of the artifact, when the server can vouch for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl UpdateResponse {
    pub fn has_update(&self) -> bool {
        self.version_code.is_some() && self.version_name.is_some() && self.download_url.is_some()
    }

    pub fn to_update_info(&self) -> Option<UpdateInfo> {
        if !self.has_update() {
            return None;
        }
        Some(UpdateInfo {
            version_code: self.version_code.unwrap(),
            version_name: self.version_name.clone().unwrap(),
            download_url: self.download_url.clone().unwrap(),
            release_notes: self.release_notes.clone().unwrap_or_default(),
            is_force_update: self.is_force_update,
            sha256: self.sha256.clone(),
        })
    }
}

/// A concrete available update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version_code: u32,
    pub version_name: String,
    pub download_url: String,
    pub release_notes: String,
    pub is_force_update: bool,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerVersionInfo {
    pub current_version: String,
    pub version_code: u32,
    pub release_notes: String,
    pub is_force_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionIncrementRequest {
    pub version: String,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub is_force_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionIncrementResponse {
    pub success: bool,
    pub message: String,
    pub new_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionResetRequest {
    pub target_version: String,
    pub reason: String,
}

impl Default for VersionResetRequest {
    fn default() -> Self {
        Self {
            target_version: "1.0".to_string(),
            reason: "Reset to start new version cycle".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResetResponse {
    pub success: bool,
    pub message: String,
    pub reset_version: String,
    pub previous_version: String,
}

/// Network collaborator serving version metadata and the
/// administrative version operations.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn check_update(&self, current_version: &str) -> Result<UpdateResponse>;
    async fn server_version(&self) -> Result<ServerVersionInfo>;
    async fn increment_version(
        &self,
        req: &VersionIncrementRequest,
    ) -> Result<VersionIncrementResponse>;
    async fn reset_version(&self, req: &VersionResetRequest) -> Result<VersionResetResponse>;
}

/// reqwest-backed metadata client
pub struct HttpMetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetadataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::NetworkUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn classify(e: reqwest::Error) -> UpdateError {
        if e.is_timeout() {
            UpdateError::Timeout(e.to_string())
        } else {
            UpdateError::NetworkUnavailable(e.to_string())
        }
    }

    fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(UpdateError::NotFound(resp.url().to_string()))
        } else if !status.is_success() {
            Err(UpdateError::NetworkUnavailable(format!(
                "server returned {status}"
            )))
        } else {
            Ok(resp)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await.map_err(Self::classify)?;
        Self::check_status(resp)?
            .json::<T>()
            .await
            .map_err(Self::classify)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(Self::classify)?;
        Self::check_status(resp)?
            .json::<T>()
            .await
            .map_err(Self::classify)
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn check_update(&self, current_version: &str) -> Result<UpdateResponse> {
        self.get_json(&format!("/update?version={current_version}"))
            .await
    }

    async fn server_version(&self) -> Result<ServerVersionInfo> {
        self.get_json("/version/current").await
    }

    async fn increment_version(
        &self,
        req: &VersionIncrementRequest,
    ) -> Result<VersionIncrementResponse> {
        self.post_json("/version/increment", req).await
    }

    async fn reset_version(&self, req: &VersionResetRequest) -> Result<VersionResetResponse> {
        self.post_json("/version/reset", req).await
    }
}

// ============================================================================
// Fake Metadata Client (deterministic tests)
// ============================================================================

/// Canned metadata client for tests.
pub struct FakeMetadataClient {
    pub update_response: UpdateResponse,
    pub server_version: ServerVersionInfo,
}

impl FakeMetadataClient {
    /// A server with nothing newer than the given version.
    pub fn up_to_date(version: &str) -> Self {
        Self {
            update_response: UpdateResponse {
                message: Some("No update available".to_string()),
                current_version: Some(version.to_string()),
                latest_version: Some(version.to_string()),
                ..Default::default()
            },
            server_version: ServerVersionInfo {
                current_version: version.to_string(),
                version_code: 1,
                release_notes: String::new(),
                is_force_update: false,
            },
        }
    }

    /// A server offering the given version at the given URL.
    pub fn offering(version: &str, version_code: u32, download_url: &str) -> Self {
        Self {
            update_response: UpdateResponse {
                version_code: Some(version_code),
                version_name: Some(version.to_string()),
                download_url: Some(download_url.to_string()),
                release_notes: Some(format!("Release {version}")),
                ..Default::default()
            },
            server_version: ServerVersionInfo {
                current_version: version.to_string(),
                version_code,
                release_notes: format!("Release {version}"),
                is_force_update: false,
            },
        }
    }

    pub fn with_sha256(mut self, sha256: &str) -> Self {
        self.update_response.sha256 = Some(sha256.to_string());
        self
    }
}

#[async_trait]
impl MetadataClient for FakeMetadataClient {
    async fn check_update(&self, _current_version: &str) -> Result<UpdateResponse> {
        Ok(self.update_response.clone())
    }

    async fn server_version(&self) -> Result<ServerVersionInfo> {
        Ok(self.server_version.clone())
    }

    async fn increment_version(
        &self,
        req: &VersionIncrementRequest,
    ) -> Result<VersionIncrementResponse> {
        Ok(VersionIncrementResponse {
            success: true,
            message: format!("Version {} created successfully", req.version),
            new_version: req.version.clone(),
        })
    }

    async fn reset_version(&self, req: &VersionResetRequest) -> Result<VersionResetResponse> {
        Ok(VersionResetResponse {
            success: true,
            message: format!("Version reset to {} successfully", req.target_version),
            reset_version: req.target_version.clone(),
            previous_version: self.server_version.current_version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_update_requires_all_fields() {
        let mut resp = UpdateResponse {
            version_code: Some(2),
            version_name: Some("1.1".to_string()),
            download_url: Some("http://host/snapup-v1.1.apk".to_string()),
            ..Default::default()
        };
        assert!(resp.has_update());

        resp.download_url = None;
        assert!(!resp.has_update());
        assert!(resp.to_update_info().is_none());
    }

    #[test]
    fn test_update_response_wire_shape() {
        let json = r#"{
            "versionCode": 3,
            "versionName": "1.2",
            "downloadUrl": "http://host/snapup-v1.2.apk",
            "releaseNotes": "Added auto-installation",
            "isForceUpdate": true
        }"#;
        let resp: UpdateResponse = serde_json::from_str(json).unwrap();
        let info = resp.to_update_info().unwrap();
        assert_eq!(info.version_name, "1.2");
        assert_eq!(info.version_code, 3);
        assert!(info.is_force_update);
        assert!(info.sha256.is_none());
    }

    #[test]
    fn test_no_update_wire_shape() {
        let json = r#"{
            "message": "No update available",
            "currentVersion": "1.2",
            "latestVersion": "1.2"
        }"#;
        let resp: UpdateResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.has_update());
        assert_eq!(resp.latest_version.as_deref(), Some("1.2"));
    }
}
