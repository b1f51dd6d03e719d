//! Where surface data comes from.
//!
//! [`SurfaceSource`] is the seam between the Transport Manager and the
//! network. [`HttpSurfaceSource`] talks to a real canvas server; tests
//! plug in in-memory fakes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use surface_sync_core::config::{ServerConfig, TransportConfig};
use surface_sync_core::error::SurfaceSyncError;
use surface_sync_core::types::Surface;

use crate::callback::CallbackClient;

/// Text frames from an open live channel. The stream ends when the channel closes.
pub type LiveFeed = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

#[async_trait]
pub trait SurfaceSource: Send + Sync + 'static {
    /// Pull the full current surface list.
    async fn fetch_snapshot(&self) -> anyhow::Result<Vec<Surface>>;

    /// Open the live channel.
    async fn open_live(&self) -> anyhow::Result<LiveFeed>;
}

/// REST + WebSocket source for a canvas server.
pub struct HttpSurfaceSource {
    client: reqwest::Client,
    server: ServerConfig,
}

impl HttpSurfaceSource {
    pub fn new(server: ServerConfig, transport: &TransportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(transport.request_timeout())
            .build()?;
        Ok(Self { client, server })
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// Callback client sharing this source's HTTP connection pool.
    pub fn callback_client(&self) -> CallbackClient {
        CallbackClient::with_client(self.client.clone(), self.server.callback_url())
    }
}

#[async_trait]
impl SurfaceSource for HttpSurfaceSource {
    async fn fetch_snapshot(&self) -> anyhow::Result<Vec<Surface>> {
        let url = self.server.snapshot_url();
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SurfaceSyncError::Http(status.as_u16()).into());
        }

        let surfaces = resp.json::<Vec<Surface>>().await?;
        debug!(url = %url, surfaces = surfaces.len(), "Fetched canvas snapshot");
        Ok(surfaces)
    }

    async fn open_live(&self) -> anyhow::Result<LiveFeed> {
        let url = self.server.live_url();
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!(url = %url, "Live channel open");

        let feed = ws
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    // Ping/pong are answered by tungstenite; binary is not part of the protocol
                    Ok(_) => None,
                    Err(e) => Some(Err(anyhow::Error::from(e))),
                }
            });

        Ok(Box::pin(feed))
    }
}
