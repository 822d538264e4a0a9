// src/core/documents.rs
//! Document Delivery Channel: fetch the résumé binary with the caller's own
//! bearer credential, plus the local store that backs the download endpoint.

use crate::error::{ChannelDeliveryError, ValidationError};
use crate::secret::Secret;
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const PDF_MIME: &str = "application/pdf";

/// A fetched document ready for injection into a file input.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub fn resume_file_name(document_id: &str) -> String {
    format!("resume_{document_id}.pdf")
}

#[async_trait]
pub trait DocumentChannel: Send + Sync {
    async fn fetch(&self, document_id: &str, bearer: &Secret) -> Result<Document, ChannelDeliveryError>;
}

pub struct HttpDocumentChannel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentChannel {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Pull `filename="..."` out of a Content-Disposition header.
fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl DocumentChannel for HttpDocumentChannel {
    async fn fetch(&self, document_id: &str, bearer: &Secret) -> Result<Document, ChannelDeliveryError> {
        let url = format!("{}/{}", self.base_url, document_id);
        info!("Fetching document {} from {}", document_id, self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer.expose())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Document download failed with {}: {}", status, body);
            return Err(ChannelDeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let headers = response.headers();
        let mime_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| PDF_MIME.to_string());
        let file_name = headers
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name)
            .unwrap_or_else(|| resume_file_name(document_id));

        let bytes = response.bytes().await?.to_vec();
        info!("Fetched document {} ({} bytes)", file_name, bytes.len());

        Ok(Document {
            bytes,
            file_name,
            mime_type,
        })
    }
}

// ===== Server-side résumé store =====

/// Reads résumés stored as `<dir>/<id>.pdf`.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    dir: PathBuf,
}

impl ResumeStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Document ids become file names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn validate_id(id: &str) -> Result<(), ValidationError> {
        let valid = !id.is_empty()
            && id.len() <= 128
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(ValidationError::InvalidIdentifier(id.to_string()))
        }
    }

    /// `Ok(None)` when the document does not exist.
    pub async fn read(&self, id: &str) -> anyhow::Result<Option<Document>> {
        Self::validate_id(id)?;
        let path = self.dir.join(format!("{id}.pdf"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Document {
                bytes,
                file_name: resume_file_name(id),
                mime_type: PDF_MIME.to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read résumé file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_forwards_caller_bearer_and_reads_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/r1"))
            .and(header("Authorization", "Bearer caller-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .insert_header("Content-Disposition", "attachment; filename=\"resume_r1.pdf\"")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            HttpDocumentChannel::new(format!("{}/download/", server.uri()), Duration::from_secs(5)).unwrap();
        let doc = channel.fetch("r1", &Secret::new("caller-token")).await.unwrap();

        assert_eq!(doc.bytes, b"%PDF-1.4");
        assert_eq!(doc.file_name, "resume_r1.pdf");
        assert_eq!(doc.mime_type, PDF_MIME);
    }

    #[tokio::test]
    async fn fetch_surfaces_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Resume file not found"))
            .mount(&server)
            .await;

        let channel = HttpDocumentChannel::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = channel.fetch("missing", &Secret::new("t")).await.unwrap_err();
        assert!(matches!(err, ChannelDeliveryError::Rejected { status: 404, .. }));
    }

    #[test]
    fn disposition_parsing() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"cv.pdf\""),
            Some("cv.pdf".to_string())
        );
        assert_eq!(disposition_file_name("inline"), None);
    }

    #[tokio::test]
    async fn store_reads_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("r9.pdf"), b"pdf").await.unwrap();
        let store = ResumeStore::new(dir.path().to_path_buf());

        let doc = store.read("r9").await.unwrap().unwrap();
        assert_eq!(doc.file_name, "resume_r9.pdf");
        assert!(store.read("absent").await.unwrap().is_none());
        assert!(store.read("../etc/passwd").await.is_err());
    }
}
