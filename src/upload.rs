use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::codec::ImageFile;
use crate::errors::PadError;

/// Sends a finished signature image to storage and returns the storage path
/// the server assigned. Implementations never retry; the person signing
/// decides whether to press save again.
#[allow(async_fn_in_trait)]
pub trait SignatureUploader {
    async fn upload(&self, file: &ImageFile) -> Result<String, PadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "filePath", alias = "file_path", alias = "location")]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct RejectionBody {
    message: Option<String>,
    error: Option<String>,
}

/// Multipart upload to `POST <origin>/upload/signature`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: Client,
    endpoint: Url,
    field: String,
}

impl HttpUploader {
    pub fn new(http: Client, endpoint: Url, field: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            field: field.into(),
        }
    }

    pub fn with_timeout(
        endpoint: Url,
        field: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PadError> {
        let http = Client::builder().timeout(timeout).build().map_err(|error| {
            PadError::network_unavailable(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self::new(http, endpoint, field))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SignatureUploader for HttpUploader {
    async fn upload(&self, file: &ImageFile) -> Result<String, PadError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.media_type)
            .map_err(|error| {
                PadError::malformed_encoding(format!(
                    "invalid media type '{}': {error}",
                    file.media_type
                ))
            })?;
        let form = Form::new().part(self.field.clone(), part);

        debug!(
            endpoint = self.endpoint.as_str(),
            bytes = file.bytes.len(),
            "uploading signature"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|error| {
                PadError::network_unavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            PadError::network_unavailable(format!("failed to read upload response: {error}"))
        })?;

        if !status.is_success() {
            let rejection = serde_json::from_str::<RejectionBody>(&body).unwrap_or_default();
            let message = rejection
                .message
                .or(rejection.error)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(PadError::upload_rejected(message)
                .with_details(serde_json::json!({ "status": status.as_u16() })));
        }

        let parsed: UploadResponse = serde_json::from_str(&body).map_err(|error| {
            PadError::upload_rejected(format!(
                "upload response did not include a storage path: {error}"
            ))
        })?;
        info!(path = parsed.path.as_str(), "signature uploaded");
        Ok(parsed.path)
    }
}

/// Stores uploads under a local root with the same `<prefix><name>` layout the
/// server uses. File names are derived from the content hash.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
    prefix: String,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SignatureUploader for DirectoryUploader {
    async fn upload(&self, file: &ImageFile) -> Result<String, PadError> {
        let extension = Path::new(&file.file_name)
            .extension()
            .and_then(|value| value.to_str())
            .unwrap_or("png");
        let relative = format!(
            "{}{}.{}",
            self.prefix.trim_start_matches('/'),
            content_name(&file.bytes),
            extension
        );
        let destination = self.root.join(&relative);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                PadError::upload_rejected(format!(
                    "failed to create upload directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&destination, &file.bytes).map_err(|error| {
            PadError::upload_rejected(format!(
                "failed to write {}: {error}",
                destination.display()
            ))
        })?;

        info!(path = relative.as_str(), "signature stored locally");
        Ok(relative)
    }
}

/// `signature-` plus the first 16 hex digits of the SHA-256 of `bytes`.
pub fn content_name(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::from("signature-");
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
