//! Google Drive storage provider.
//!
//! Accessed via the Drive v3 REST API over `reqwest` using a
//! service-account JWT bearer token (a self-signed JWT exchanged for an
//! access token via Google's OAuth token endpoint), rather than a
//! generated API client, since no Drive SDK crate is part of the
//! dependency stack.
//!
//! Layout: a top-level "subfolder" per target (created on demand) under
//! the configured root folder id, with artifacts placed directly inside
//! it. `backup_id` is the Drive file id; validity is established by
//! walking the file's parent chain back to the root, capped at 50 hops.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::StorageProvider;
use crate::error::{BackupError, Result};
use crate::models::StoredBackup;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const MAX_PARENT_HOPS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct GoogleDriveProvider {
    folder_id: String,
    service_account: ServiceAccountKey,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleDriveProvider {
    pub fn new(service_account_json: &str, folder_id: String) -> Result<Self> {
        let service_account: ServiceAccountKey = serde_json::from_str(service_account_json)
            .map_err(|e| BackupError::Validation(format!("invalid service account JSON: {e}")))?;
        Ok(Self {
            folder_id,
            service_account,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() + chrono::Duration::seconds(60) {
                return Ok(cached.access_token.clone());
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let claims = JwtClaims {
            iss: self.service_account.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: self.service_account.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.service_account.private_key.as_bytes())
            .map_err(|e| BackupError::Crypto(format!("invalid service account private key: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| BackupError::Crypto(format!("failed to sign service account JWT: {e}")))?;

        let response = self
            .http
            .post(&self.service_account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let token: TokenResponse = response.json().await?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in as i64),
        };
        *guard = Some(cached);
        Ok(token.access_token)
    }

    fn split_prefix(prefix: &str) -> (String, String) {
        match prefix.split_once('/') {
            Some((sub, rest)) => (sub.to_string(), rest.to_string()),
            None => (String::new(), prefix.to_string()),
        }
    }

    async fn find_child_folder_id(&self, parent_id: &str, name: &str) -> Result<Option<String>> {
        let token = self.access_token().await?;
        let query = format!(
            "mimeType='application/vnd.google-apps.folder' and name='{}' and '{}' in parents and trashed=false",
            name.replace('\'', "\\'"),
            parent_id
        );
        let response = self
            .http
            .get(DRIVE_API)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        Ok(body["files"][0]["id"].as_str().map(|s| s.to_string()))
    }

    async fn ensure_child_folder_id(&self, parent_id: &str, name: &str) -> Result<String> {
        if let Some(id) = self.find_child_folder_id(parent_id, name).await? {
            return Ok(id);
        }
        let token = self.access_token().await?;
        let body = serde_json::json!({
            "name": name,
            "mimeType": "application/vnd.google-apps.folder",
            "parents": [parent_id],
        });
        let response = self
            .http
            .post(DRIVE_API)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let created: serde_json::Value = response.json().await?;
        created["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BackupError::ProviderFailure("drive folder create returned no id".into()))
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<(String, String, DateTime<Utc>, Option<u64>)>> {
        let token = self.access_token().await?;
        let query = format!(
            "'{}' in parents and mimeType != 'application/vnd.google-apps.folder' and trashed=false",
            parent_id
        );
        let response = self
            .http
            .get(DRIVE_API)
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,size,createdTime)"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let mut out = Vec::new();
        if let Some(files) = body["files"].as_array() {
            for f in files {
                let id = f["id"].as_str().unwrap_or_default().to_string();
                let name = f["name"].as_str().unwrap_or_default().to_string();
                let size = f["size"].as_str().and_then(|s| s.parse::<u64>().ok());
                let created_at = f["createdTime"]
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                out.push((id, name, created_at, size));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageProvider for GoogleDriveProvider {
    fn name(&self) -> &str {
        "google_drive"
    }

    async fn list_backups(&self, prefix: &str) -> Result<Vec<StoredBackup>> {
        let (subfolder, file_prefix) = Self::split_prefix(prefix);
        let parent = if subfolder.is_empty() {
            self.folder_id.clone()
        } else {
            match self.find_child_folder_id(&self.folder_id, &subfolder).await? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            }
        };
        let children = self.list_children(&parent).await?;
        let mut backups: Vec<StoredBackup> = children
            .into_iter()
            .filter(|(_, name, ..)| name.starts_with(&file_prefix))
            .map(|(id, name, created_at, size)| StoredBackup {
                id,
                name,
                created_at,
                size,
            })
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    async fn upload_backup(&self, local_path: &Path, dest_name: &str) -> Result<StoredBackup> {
        let (subfolder, filename) = Self::split_prefix(dest_name);
        let parent = if subfolder.is_empty() {
            self.folder_id.clone()
        } else {
            self.ensure_child_folder_id(&self.folder_id, &subfolder).await?
        };

        let token = self.access_token().await?;
        let data = tokio::fs::read(local_path).await?;
        let metadata = serde_json::json!({ "name": filename, "parents": [parent] });

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json; charset=UTF-8")
                    .expect("static mime type is valid"),
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(data.clone())
                    .mime_str("application/octet-stream")
                    .expect("static mime type is valid"),
            );

        let response = self
            .http
            .post(format!("{DRIVE_UPLOAD_API}?uploadType=multipart&fields=id,name,createdTime,size"))
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let created: serde_json::Value = response.json().await?;
        let id = created["id"]
            .as_str()
            .ok_or_else(|| BackupError::ProviderFailure("drive upload returned no id".into()))?
            .to_string();
        let created_at = created["createdTime"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(StoredBackup {
            id,
            name: filename,
            created_at,
            size: Some(data.len() as u64),
        })
    }

    async fn download_backup(&self, backup_id: &str, dest_path: &Path) -> Result<()> {
        self.validate_backup_id(backup_id).await?;
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{DRIVE_API}/{backup_id}?alt=media"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest_path, &bytes).await?;
        Ok(())
    }

    async fn delete_backups(&self, backups: &[StoredBackup]) -> Result<()> {
        for backup in backups {
            self.validate_backup_id(&backup.id).await?;
        }
        let token = self.access_token().await?;
        for backup in backups {
            self.http
                .delete(format!("{DRIVE_API}/{}", backup.id))
                .bearer_auth(&token)
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    async fn validate_backup_id(&self, backup_id: &str) -> Result<()> {
        let token = self.access_token().await?;
        let mut current = backup_id.to_string();
        for _ in 0..MAX_PARENT_HOPS {
            let response = self
                .http
                .get(format!("{DRIVE_API}/{current}"))
                .bearer_auth(&token)
                .query(&[("fields", "id,parents")])
                .send()
                .await?
                .error_for_status()?;
            let body: serde_json::Value = response.json().await?;
            let parents = body["parents"].as_array().cloned().unwrap_or_default();
            if parents.iter().any(|p| p.as_str() == Some(self.folder_id.as_str())) {
                return Ok(());
            }
            match parents.first().and_then(|p| p.as_str()) {
                Some(next) => current = next.to_string(),
                None => break,
            }
        }
        Err(BackupError::Validation(format!(
            "invalid backup_id for this destination: {backup_id}"
        )))
    }
}
