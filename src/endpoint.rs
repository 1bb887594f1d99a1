use crate::error::UploadError;
use crate::task::{TaskId, TaskMetadata};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Everything the remote store receives for one attempt.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub task_id: TaskId,
    pub filename: String,
    pub content_type: String,
    pub metadata: TaskMetadata,
    pub payload: Vec<u8>,
}

/// Remote store that accepts a blob and answers with its URL.
///
/// Any error is retried by the queue until the attempt budget runs out;
/// implementations do not need to classify failures.
#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Multipart POST endpoint returning `{ "url": ... }`.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpEndpoint {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn form(request: UploadRequest) -> Result<Form, UploadError> {
        let part = Part::bytes(request.payload)
            .file_name(request.filename.clone())
            .mime_str(&request.content_type)
            .map_err(|e| {
                UploadError::Transport(format!(
                    "Invalid content type {}: {}",
                    request.content_type, e
                ))
            })?;

        let mut form = Form::new()
            .part("file", part)
            .text("filename", request.filename)
            .text("task_id", request.task_id.to_string());
        for (key, value) in request.metadata {
            form = form.text(key, value);
        }
        Ok(form)
    }
}

#[async_trait]
impl UploadEndpoint for HttpEndpoint {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        log::debug!("POST {} ({} bytes) to {}", request.filename, request.payload.len(), self.url);

        let mut builder = self.client.post(&self.url).multipart(Self::form(request)?);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to get error details".to_string());
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        if parsed.url.trim().is_empty() {
            return Err(UploadError::InvalidResponse(
                "response carried an empty url".to_string(),
            ));
        }
        Ok(parsed.url)
    }

    fn name(&self) -> &str {
        "http"
    }
}
