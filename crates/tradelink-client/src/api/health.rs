//! Health API.

use crate::client::TradelinkClient;
use crate::error::Result;
use crate::types::HealthResponse;

/// Health API client.
pub struct HealthApi {
    client: TradelinkClient,
}

impl HealthApi {
    pub(crate) fn new(client: TradelinkClient) -> Self {
        Self { client }
    }

    /// Fetch the backend health status.
    pub async fn check(&self) -> Result<HealthResponse> {
        self.client.get("health").await
    }

    /// Whether the backend is reachable and healthy.
    pub async fn is_healthy(&self) -> bool {
        self.check().await.is_ok()
    }
}
