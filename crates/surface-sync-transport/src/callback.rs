//! Interaction callbacks: fire-and-forget POSTs back to the server.

use tracing::{debug, warn};

use surface_sync_core::config::ServerConfig;
use surface_sync_core::protocol::CallbackRequest;

#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    url: String,
}

impl CallbackClient {
    pub fn new(server: &ServerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), server.callback_url())
    }

    pub fn with_client(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post an interaction for a surface. Failures are logged, never returned.
    ///
    /// Returns whether the server accepted the callback.
    pub async fn send(
        &self,
        surface_id: &str,
        action: &str,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        let body = CallbackRequest {
            surface_id: surface_id.to_string(),
            action: action.to_string(),
            data,
        };

        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(surface_id, action, "Callback delivered");
                true
            }
            Ok(resp) => {
                warn!(surface_id, action, status = %resp.status(), "Callback rejected");
                false
            }
            Err(e) => {
                warn!(surface_id, action, %e, "Callback failed");
                false
            }
        }
    }

    /// Send in the background without waiting for the outcome.
    pub fn send_detached(
        &self,
        surface_id: impl Into<String>,
        action: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) {
        let this = self.clone();
        let surface_id = surface_id.into();
        let action = action.into();
        tokio::spawn(async move {
            this.send(&surface_id, &action, data).await;
        });
    }
}
