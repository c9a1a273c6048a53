//! HTTP boundary for document submission.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::model::{DocumentId, DocumentResponse, SubmissionRequest};
use crate::config::ApiConfig;
use crate::error::{ClientError, Result};

/// Path of the document-creation endpoint, relative to the API base URL.
pub const CREATE_DOCUMENT_PATH: &str = "/api/v3/lk/documents/create";

/// Something that can deliver a validated document to the remote service.
///
/// The client only relies on this trait, so it can run against the real
/// HTTP API or a test double.
#[async_trait]
pub trait DocumentSubmitter: Send + Sync {
    /// Send one document and return the identifier the service assigned.
    async fn submit(&self, request: &SubmissionRequest) -> Result<DocumentId>;
}

/// Submits documents with a `POST` to the document-creation endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpSubmitter {
    /// Create a submitter for the API rooted at `base_url`.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), CREATE_DOCUMENT_PATH);

        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }

    /// Create a submitter from the `api` section of the configuration.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        Self::new(&api.base_url, api.token.clone(), api.timeout())
    }

    /// Full URL documents are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentSubmitter for HttpSubmitter {
    #[instrument(
        skip(self, request),
        fields(
            product_group = %request.product_group,
            document_format = ?request.document_format
        )
    )]
    async fn submit(&self, request: &SubmissionRequest) -> Result<DocumentId> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(
            endpoint = %self.endpoint,
            status = status.as_u16(),
            body_len = body.len(),
            "Received response"
        );

        if status != StatusCode::OK {
            // Error bodies are best effort; the status alone is enough to fail.
            let parsed: DocumentResponse = serde_json::from_slice(&body).unwrap_or_default();
            warn!(status = status.as_u16(), "Document service rejected the request");
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: parsed.error_code,
                message: parsed
                    .error_message
                    .unwrap_or_else(|| "Failed to send API request".to_string()),
                description: parsed.error_description,
            });
        }

        let parsed: DocumentResponse = serde_json::from_slice(&body)?;
        parsed.into_result(status.as_u16())
    }
}
