//! Google Drive API client for basic file operations.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, Response};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::cache::CredentialCache;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListResponse, FileMetadata};

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Threshold for resumable upload (500 MB).
const RESUMABLE_THRESHOLD: u64 = 500 * 1024 * 1024;

/// Client for creating, listing, updating and deleting Drive files.
pub struct DriveClient {
    auth: CredentialCache,
    scopes: Vec<String>,
    api_base: String,
    upload_base: String,
    resumable_threshold: u64,
    http: Client,
}

impl DriveClient {
    /// Create a new DriveClient.
    ///
    /// No credential is obtained until the first request is made.
    ///
    /// # Arguments
    /// * `auth` - Credential cache used for every request
    /// * `scopes` - Scopes requested from the cache
    pub fn new(auth: CredentialCache, scopes: Vec<String>) -> Self {
        Self {
            auth,
            scopes,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            resumable_threshold: RESUMABLE_THRESHOLD,
            http: Client::new(),
        }
    }

    /// Point the client at different API and upload endpoints.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Files larger than `bytes` are sent with a resumable upload.
    pub fn with_resumable_threshold(mut self, bytes: u64) -> Self {
        self.resumable_threshold = bytes;
        self
    }

    async fn token(&self) -> Result<String> {
        self.auth.access_token(&self.scopes).await
    }

    /// Upload a new file.
    ///
    /// # Arguments
    /// * `name` - Name of the file in Drive
    /// * `mime_type` - MIME type of the uploaded content
    /// * `local_path` - Path to the local file
    pub async fn create_file<P: AsRef<Path>>(
        &self,
        name: &str,
        mime_type: &str,
        local_path: P,
    ) -> Result<FileMetadata> {
        let url = format!("{}/files", self.upload_base);
        let metadata = serde_json::json!({ "name": name });
        self.upload(Method::POST, &url, metadata, local_path.as_ref(), mime_type)
            .await
    }

    /// List up to `page_size` files visible to the user.
    pub async fn list_files(&self, page_size: u32) -> Result<Vec<FileMetadata>> {
        let token = self.token().await?;

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("pageSize", page_size.to_string().as_str()),
                ("fields", "nextPageToken, files(id, name)"),
            ])
            .send()
            .await?;

        let list_response: FileListResponse = check_response(response).await?.json().await?;
        debug!(
            count = list_response.files.len(),
            more = list_response.next_page_token.is_some(),
            "listed files"
        );
        Ok(list_response.files)
    }

    /// Replace a file's name and content.
    ///
    /// # Arguments
    /// * `file_id` - ID of the file to update
    /// * `new_name` - New name of the file
    /// * `mime_type` - MIME type of the new content
    /// * `local_path` - Path to the local file holding the new content
    pub async fn update_file<P: AsRef<Path>>(
        &self,
        file_id: &str,
        new_name: &str,
        mime_type: &str,
        local_path: P,
    ) -> Result<FileMetadata> {
        let url = format!("{}/files/{}", self.upload_base, file_id);
        let metadata = serde_json::json!({ "name": new_name });
        self.upload(Method::PATCH, &url, metadata, local_path.as_ref(), mime_type)
            .await
    }

    /// Delete a file by ID.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let token = self.token().await?;

        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }

    /// Send metadata and content, picking multipart or resumable upload by size.
    async fn upload(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        local_path: &Path,
        mime_type: &str,
    ) -> Result<FileMetadata> {
        let file_size = tokio::fs::metadata(local_path).await?.len();
        debug!(%method, url, size = file_size, "uploading {}", local_path.display());

        if file_size > self.resumable_threshold {
            self.upload_resumable(method, url, metadata, local_path, mime_type)
                .await
        } else {
            self.upload_multipart(method, url, metadata, local_path, mime_type)
                .await
        }
    }

    /// Upload a file using multipart upload (for smaller files).
    async fn upload_multipart(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        local_path: &Path,
        mime_type: &str,
    ) -> Result<FileMetadata> {
        let token = self.token().await?;
        let file_content = tokio::fs::read(local_path).await?;

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;
        let file_part = Part::bytes(file_content).mime_str(mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let response = self
            .http
            .request(method, url)
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id, name, mimeType")])
            .multipart(form)
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    /// Upload a file using resumable upload (for larger files).
    async fn upload_resumable(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        local_path: &Path,
        mime_type: &str,
    ) -> Result<FileMetadata> {
        let token = self.token().await?;
        let file = tokio::fs::File::open(local_path).await?;
        let file_size = file.metadata().await?.len();

        // Step 1: Initiate resumable upload session
        let init_response = self
            .http
            .request(method, url)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", file_size.to_string())
            .json(&metadata)
            .send()
            .await?;

        let init_response = check_response(init_response).await?;
        let upload_url = init_response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::ApiError {
                status: init_response.status().as_u16(),
                message: "No upload URL in response".to_string(),
            })?
            .to_string();

        // Step 2: Stream the file content
        let upload_response = self
            .http
            .put(&upload_url)
            .header("Content-Type", mime_type)
            .header("Content-Length", file_size.to_string())
            .query(&[("fields", "id, name, mimeType")])
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        Ok(check_response(upload_response).await?.json().await?)
    }
}

/// Turn a non-success response into an `ApiError`, decoding Google's error
/// envelope when present.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}
