use crate::constants::{DEFAULT_EPOCHS, DEFAULT_WALRUS_AGGREGATOR, DEFAULT_WALRUS_PUBLISHER};
use crate::endpoint::{UploadEndpoint, UploadRequest};
use crate::error::UploadError;
use crate::utils::build_walrus_access_url;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walrus_rs::WalrusClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalrusOptions {
    pub aggregator_url: String,
    pub publisher_url: String,
    #[serde(default)]
    pub epochs: Option<u64>,
}

impl Default for WalrusOptions {
    fn default() -> Self {
        Self {
            aggregator_url: DEFAULT_WALRUS_AGGREGATOR.to_string(),
            publisher_url: DEFAULT_WALRUS_PUBLISHER.to_string(),
            epochs: Some(DEFAULT_EPOCHS),
        }
    }
}

impl WalrusOptions {
    pub fn new(
        aggregator_url: Option<String>,
        publisher_url: Option<String>,
        epochs: Option<u64>,
    ) -> Self {
        Self {
            aggregator_url: aggregator_url
                .unwrap_or_else(|| DEFAULT_WALRUS_AGGREGATOR.to_string()),
            publisher_url: publisher_url.unwrap_or_else(|| DEFAULT_WALRUS_PUBLISHER.to_string()),
            epochs: epochs.or(Some(DEFAULT_EPOCHS)),
        }
    }
}

/// Stores each payload as a Walrus blob and answers with the aggregator URL.
pub struct WalrusEndpoint {
    client: WalrusClient,
    options: WalrusOptions,
}

impl WalrusEndpoint {
    pub fn new(options: WalrusOptions) -> Result<Self, UploadError> {
        let client = WalrusClient::new(&options.aggregator_url, &options.publisher_url)
            .map_err(|e| UploadError::Transport(format!("Failed to create Walrus client: {}", e)))?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &WalrusOptions {
        &self.options
    }
}

#[async_trait]
impl UploadEndpoint for WalrusEndpoint {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        log::debug!(
            "Storing {} ({} bytes) on Walrus for {:?} epochs",
            request.filename,
            request.payload.len(),
            self.options.epochs
        );

        // Deletable, so a superseded capture can be dropped later.
        let store_result = self
            .client
            .store_blob(request.payload, self.options.epochs, Some(true), None, None)
            .await
            .map_err(|e| UploadError::Transport(format!("Failed to store blob: {}", e)))?;

        match store_result.newly_created {
            Some(newly_created) => Ok(build_walrus_access_url(
                &self.options.aggregator_url,
                &newly_created.blob_object.blob_id,
            )),
            None => Err(UploadError::InvalidResponse(
                "Walrus did not create a new blob".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "walrus"
    }
}
