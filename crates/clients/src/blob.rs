use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Client for the content-addressable blob store holding résumé uploads.
/// The store only exposes `put`; deletion and versioning are not part of
/// the contract.
#[derive(Clone)]
pub struct BlobClient {
    http: Client,
    base_url: Url,
}

impl BlobClient {
    /// Creates a new blob client with the provided configuration.
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Uploads the bytes under `path` and returns the public URL the store
    /// assigned. The SHA-256 digest accompanies the upload so the store can
    /// verify content integrity.
    pub async fn put(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        let digest = hex::encode(Sha256::digest(&bytes));
        let url = self.base_url.join(path)?;
        let response = self
            .http
            .put(url)
            .header("Content-Type", content_type)
            .header("X-Content-Sha256", digest)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(BlobError::Status { status, body });
        }

        let stored: StoredBlob = response.json().await?;
        Ok(stored.url)
    }

    /// Collision-free object path for a résumé upload, keyed by submitter,
    /// upload time and the original filename.
    pub fn resume_path(seeker_id: &str, uploaded_at: DateTime<Utc>, filename: &str) -> String {
        format!(
            "resumes/{seeker_id}/{}_{}",
            uploaded_at.timestamp(),
            sanitize_filename(filename)
        )
    }
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "resume".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Deserialize)]
struct StoredBlob {
    url: String,
}

/// Errors produced by the blob client.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_sends_digest_and_returns_the_stored_url() {
        let server = MockServer::start();
        let payload = b"fake pdf bytes".to_vec();
        let digest = hex::encode(Sha256::digest(&payload));
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/resumes/u-1/1700000000_cv.pdf")
                .header("Content-Type", "application/pdf")
                .header("X-Content-Sha256", &digest);
            then.status(201)
                .json_body(json!({ "url": "https://cdn.example/abc123" }));
        });

        let base_url: Url = server.base_url().parse().unwrap();
        let client = BlobClient::new(base_url.join("/").unwrap(), Client::new());
        let url = client
            .put("resumes/u-1/1700000000_cv.pdf", "application/pdf", payload)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(url, "https://cdn.example/abc123");
    }

    #[tokio::test]
    async fn rejected_uploads_surface_the_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path_contains("resumes");
            then.status(507).body("store full");
        });

        let base_url: Url = server.base_url().parse().unwrap();
        let client = BlobClient::new(base_url.join("/").unwrap(), Client::new());
        let err = client
            .put("resumes/u-1/1_cv.pdf", "application/pdf", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Status { .. }));
    }

    #[test]
    fn resume_paths_are_keyed_by_submitter_time_and_name() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(
            BlobClient::resume_path("u-1", at, "cv.pdf"),
            "resumes/u-1/1700000000_cv.pdf"
        );
        // Hostile names are flattened, not rejected.
        assert_eq!(
            BlobClient::resume_path("u-1", at, "../../etc/passwd"),
            "resumes/u-1/1700000000_.._.._etc_passwd"
        );
    }
}
