//! Canvas session: a Transport Manager feeding a Reconciler.
//!
//! The session is the explicit context object that owns both halves and
//! their lifecycle. Data flows one way: transport events in, display set
//! out. Readers get the display set through a `watch` channel, and every
//! recomputation publishes a whole new `Arc<DisplaySet>`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use surface_sync_core::config::Config;
use surface_sync_core::types::{ConnectionState, SyncEvent};
use surface_sync_transport::{
    CallbackClient, HttpSurfaceSource, SurfaceSource, TransportHandle, TransportManager,
};

use crate::reconciler::{DisplaySet, Reconciler};

pub struct CanvasSession {
    config: Config,
    source: Arc<dyn SurfaceSource>,
    callbacks: CallbackClient,
    display: watch::Sender<Arc<DisplaySet>>,
    reconciler: Option<Reconciler>,
    running: Option<Running>,
}

struct Running {
    transport: TransportHandle,
    cancel: CancellationToken,
    task: JoinHandle<Reconciler>,
}

impl CanvasSession {
    /// Session against the canvas server named in `config`.
    pub fn connect(config: Config) -> anyhow::Result<Self> {
        let source = HttpSurfaceSource::new(config.server.clone(), &config.transport)?;
        let callbacks = source.callback_client();
        let mut session = Self::new(config, Arc::new(source));
        session.callbacks = callbacks;
        Ok(session)
    }

    /// Session over any surface source.
    pub fn new(config: Config, source: Arc<dyn SurfaceSource>) -> Self {
        let callbacks = CallbackClient::new(&config.server);
        let reconciler = Reconciler::new(config.canvas.exit_duration());
        let (display, _) = watch::channel(reconciler.display());
        Self {
            config,
            source,
            callbacks,
            display,
            reconciler: Some(reconciler),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start syncing. Returns immediately; a no-op if already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            debug!("Canvas session already running");
            return;
        }

        let mut transport =
            TransportManager::new(self.config.transport.clone(), self.source.clone()).start();
        let Some(events) = transport.take_events() else {
            warn!("Transport event stream unavailable");
            return;
        };

        let reconciler = self
            .reconciler
            .take()
            .unwrap_or_else(|| Reconciler::new(self.config.canvas.exit_duration()));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconcile(
            reconciler,
            events,
            self.display.clone(),
            cancel.clone(),
        ));

        info!(server = %self.config.server.base_url, "Canvas session started");
        self.running = Some(Running {
            transport,
            cancel,
            task,
        });
    }

    /// Stop syncing. Safe to call repeatedly.
    ///
    /// After this returns the display set no longer changes.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.transport.stop().await;
        running.cancel.cancel();
        match (&mut running.task).await {
            Ok(reconciler) => self.reconciler = Some(reconciler),
            Err(e) => warn!(%e, "Reconciler task ended abnormally"),
        }
        info!("Canvas session stopped");
    }

    /// Current display set.
    pub fn display(&self) -> Arc<DisplaySet> {
        self.display.borrow().clone()
    }

    /// Receiver that is notified on every display set change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DisplaySet>> {
        self.display.subscribe()
    }

    pub fn connected(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.transport.connected())
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.running.as_ref().map(|r| r.transport.state())
    }

    pub fn watch_connected(&self) -> Option<watch::Receiver<bool>> {
        self.running.as_ref().map(|r| r.transport.watch_connected())
    }

    pub fn watch_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.running.as_ref().map(|r| r.transport.watch_state())
    }

    pub fn callbacks(&self) -> &CallbackClient {
        &self.callbacks
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Fold events and ghost expiry into the display set until cancelled.
///
/// One timer only: it always targets the earliest pending ghost deadline.
async fn reconcile(
    mut reconciler: Reconciler,
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
    display: watch::Sender<Arc<DisplaySet>>,
    cancel: CancellationToken,
) -> Reconciler {
    loop {
        let deadline = reconciler.next_deadline();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let label = event.label();
                if reconciler.apply(event, Instant::now()) {
                    let set = reconciler.display();
                    debug!(event = label, entries = set.len(), "Display set updated");
                    display.send_replace(set);
                }
            }
            _ = sleep_until(deadline) => {
                if reconciler.expire(Instant::now()) {
                    let set = reconciler.display();
                    debug!(entries = set.len(), "Exiting surfaces dropped");
                    display.send_replace(set);
                }
            }
        }
    }
    reconciler
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
