//! HTTP client for the Google Drive v3 REST API.
//!
//! A stateless pass-through: one best-effort call per invocation, no retries,
//! no pagination, no rate-limit handling. The access token is supplied per
//! call because it belongs to the signed-in user, not to the process.

use anyhow::{anyhow, Context, Result};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Default API host. Folder metadata and multipart uploads share it.
const BASE_URL: &str = "https://www.googleapis.com";

/// MIME marker Drive uses to type a file resource as a folder.
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A created folder resource.
#[derive(Clone, Debug, PartialEq)]
pub struct DriveFolder {
    pub id: String,
    pub name: String,
}

/// A created file resource.
#[derive(Clone, Debug, PartialEq)]
pub struct DriveFile {
    pub id: String,
    pub web_view_link: Option<String>,
}

/// Subset of the Drive file resource we ask for via `fields`.
#[derive(Debug, Deserialize)]
struct FileResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "webViewLink")]
    web_view_link: Option<String>,
}

/// HTTP client for Drive resource creation.
pub struct DriveClient {
    http_client: Client,
    base_url: String,
}

impl DriveClient {
    /// Create a client using the default Google API base URL.
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String) -> Self {
        let http_client = Client::builder()
            .user_agent("shelf/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            base_url,
        }
    }

    /// Create a folder under `parent_id` (`"root"` for the account top level).
    ///
    /// Hard error when the provider does not return an id: a provisioned
    /// user must always end up with a usable root, so this call cannot
    /// silently degrade.
    pub async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<DriveFolder> {
        let url = format!(
            "{}/drive/v3/files?fields=id,name&supportsAllDrives=true",
            self.base_url
        );

        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&metadata)
            .send()
            .await
            .context("Failed to send folder creation request")?;

        let resource = read_file_resource(response).await?;

        let id = resource
            .id
            .ok_or_else(|| anyhow!("Drive folder creation returned no id"))?;

        Ok(DriveFolder {
            id,
            name: resource.name.unwrap_or_else(|| name.to_string()),
        })
    }

    /// Upload a binary payload as a child of `parent_id`.
    ///
    /// Uses the `uploadType=multipart` endpoint: a `multipart/related` body
    /// with a JSON metadata part followed by the media part. With no parent
    /// the file lands in the provider's default top level.
    pub async fn create_file(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<DriveFile> {
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink&supportsAllDrives=true",
            self.base_url
        );

        let mut metadata = json!({ "name": name });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let boundary = Uuid::new_v4().to_string();
        let body = related_body(&boundary, &metadata.to_string(), mime_type, &content);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .context("Failed to send file upload request")?;

        let resource = read_file_resource(response).await?;

        let id = resource
            .id
            .ok_or_else(|| anyhow!("Drive upload returned no id"))?;

        Ok(DriveFile {
            id,
            web_view_link: resource.web_view_link,
        })
    }
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a `multipart/related` body: metadata part, then media part.
fn related_body(boundary: &str, metadata: &str, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Check the response status and parse the Drive file resource.
///
/// - 401 → auth error (access token expired or invalid)
/// - Other non-2xx → generic API error with the response body
async fn read_file_resource(response: reqwest::Response) -> Result<FileResource> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(anyhow!("Drive auth error: access token expired or invalid"));
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!("Drive API error {}: {}", status, body));
    }

    response
        .json::<FileResource>()
        .await
        .context("Failed to parse Drive response")
}
