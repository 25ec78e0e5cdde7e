// ==============================================================================
// upload.rs - File Management System Upload Adapter
// ==============================================================================
// Description: Submits generated files to the File Management System (FMS)
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// FMS data types (must match the FMS enumeration)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Vcf,
    Orthology,
    Daf,
    Expression,
    GeneCrossReference,
    GraphqlSchema,
    DbSummary,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Vcf => "VCF",
            FileType::Orthology => "ORTHOLOGY",
            FileType::Daf => "DAF",
            FileType::Expression => "EXPRESSION",
            FileType::GeneCrossReference => "GENECROSSREFERENCE",
            FileType::GraphqlSchema => "GRAPHQLSCHEMA",
            FileType::DbSummary => "DBSUMMARY",
        }
    }
}

/// Build tag for files spanning several assemblies
pub const COMBINED_BUILD_TAG: &str = "COMBINED";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("FMS rejected {file} with HTTP {status}: {body}")]
    Rejected { file: String, status: u16, body: String },

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("no uploader configured")]
    NotConfigured,
}

/// Single operation the generator needs from a transport
pub trait Uploader: Send + Sync {
    fn submit(
        &self,
        path: &Path,
        file_type: FileType,
        build_tag: &str,
    ) -> impl Future<Output = Result<(), UploadError>> + Send;
}

/// Placeholder used when no transport was configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUploader;

impl Uploader for NoUploader {
    async fn submit(&self, _path: &Path, _file_type: FileType, _build_tag: &str) -> Result<(), UploadError> {
        Err(UploadError::NotConfigured)
    }
}

/// HTTP client for the FMS submit endpoint
///
/// Each file is posted as one multipart part named
/// `<release>_<FILETYPE>_<build tag>` with bearer authentication.
#[derive(Debug, Clone)]
pub struct FmsUploader {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    release_version: String,
}

impl FmsUploader {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        release_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            release_version: release_version.into(),
        })
    }

    pub fn submit_url(&self) -> String {
        format!("{}/api/data/submit", self.api_url.trim_end_matches('/'))
    }

    pub fn part_name(&self, file_type: FileType, build_tag: &str) -> String {
        format!("{}_{}_{}", self.release_version, file_type.as_str(), build_tag)
    }
}

impl Uploader for FmsUploader {
    async fn submit(&self, path: &Path, file_type: FileType, build_tag: &str) -> Result<(), UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let part_name = self.part_name(file_type, build_tag);

        debug!("Submitting {} ({} bytes) as {}", file_name, bytes.len(), part_name);

        let form = Form::new().part(part_name, Part::bytes(bytes).file_name(file_name.clone()));
        let response = self
            .client
            .post(self.submit_url())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                file: file_name,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        info!("Submitted {} to FMS ({} / {})", file_name, file_type.as_str(), build_tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one request, answer it with `status` and `body`, hand back the raw request
    async fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request_complete(&request) {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        String::from_utf8_lossy(&request).to_string()
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        match headers.lines().find_map(|line| line.strip_prefix("content-length:")) {
            Some(length) => request.len() >= header_end + 4 + length.trim().parse::<usize>().unwrap_or(0),
            None => text.ends_with("0\r\n\r\n"),
        }
    }

    async fn fake_fms(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        (url, tokio::spawn(serve_once(listener, status, body)))
    }

    #[test]
    fn test_file_type_names() {
        assert_eq!(FileType::Vcf.as_str(), "VCF");
        assert_eq!(FileType::GeneCrossReference.as_str(), "GENECROSSREFERENCE");
        assert_eq!(FileType::GraphqlSchema.as_str(), "GRAPHQLSCHEMA");

        let json = serde_json::to_string(&FileType::DbSummary).unwrap();
        assert_eq!(json, "\"DBSUMMARY\"");
    }

    #[test]
    fn test_fms_submit_target() {
        let uploader = FmsUploader::new(
            "https://fms.example.org/",
            "secret",
            "7.3.0",
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(uploader.submit_url(), "https://fms.example.org/api/data/submit");
        assert_eq!(uploader.part_name(FileType::Vcf, "GRCz11"), "7.3.0_VCF_GRCz11");
    }

    #[tokio::test]
    async fn test_submit_posts_file_as_named_part() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("variants-7.3.0-1.vcf");
        std::fs::write(&path, "##fileformat=VCFv4.3\n").unwrap();

        let (url, server) = fake_fms("200 OK", "").await;
        let uploader = FmsUploader::new(url, "secret", "7.3.0", Duration::from_secs(10)).unwrap();
        uploader.submit(&path, FileType::Vcf, "GRCz11").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/data/submit HTTP/1.1\r\n"));
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.contains("authorization: bearer secret\r\n"));
        assert!(lowered.contains("content-type: multipart/form-data; boundary="));
        assert!(request.contains("name=\"7.3.0_VCF_GRCz11\""));
        assert!(request.contains("filename=\"variants-7.3.0-1.vcf\""));
        assert!(request.contains("##fileformat=VCFv4.3\n"));
    }

    #[tokio::test]
    async fn test_submit_maps_error_status_to_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("variants-7.3.0-1.vcf");
        std::fs::write(&path, "##fileformat=VCFv4.3\n").unwrap();

        let (url, server) = fake_fms("503 Service Unavailable", "maintenance\n").await;
        let uploader = FmsUploader::new(url, "secret", "7.3.0", Duration::from_secs(10)).unwrap();
        let result = uploader.submit(&path, FileType::Vcf, "GRCz11").await;
        server.await.unwrap();

        match result {
            Err(UploadError::Rejected { file, status, body }) => {
                assert_eq!(file, "variants-7.3.0-1.vcf");
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let uploader = FmsUploader::new("http://127.0.0.1:9", "secret", "7.3.0", Duration::from_secs(1)).unwrap();
        let result = uploader
            .submit(&dir.path().join("absent.vcf"), FileType::Vcf, "GRCz11")
            .await;
        assert!(matches!(result, Err(UploadError::Read { .. })));
    }

    #[tokio::test]
    async fn test_no_uploader_fails() {
        let result = NoUploader.submit(Path::new("x.vcf"), FileType::Vcf, "GRCh38").await;
        assert!(matches!(result, Err(UploadError::NotConfigured)));
    }
}
