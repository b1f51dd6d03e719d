//! Transport Manager driver.
//!
//! `start()` spawns two tasks: a one-shot initial snapshot pull, and the
//! connection loop (Connecting -> Live -> ... -> DegradedPolling). Both
//! feed a shared [`EventSink`], which is the only place events and the
//! `connected` signal are published from.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use surface_sync_core::config::TransportConfig;
use surface_sync_core::protocol::CanvasMessage;
use surface_sync_core::types::{ConnectionState, SyncEvent};

use crate::machine::{ConnectionMachine, Transition};
use crate::source::{LiveFeed, SurfaceSource};

pub struct TransportManager {
    config: TransportConfig,
    source: Arc<dyn SurfaceSource>,
}

impl TransportManager {
    pub fn new(config: TransportConfig, source: Arc<dyn SurfaceSource>) -> Self {
        Self { config, source }
    }

    /// Begin operation. Never blocks on the network; must be called inside a Tokio runtime.
    pub fn start(self) -> TransportHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let sink = Arc::new(EventSink {
            events: events_tx,
            connected: connected_tx,
            state: state_tx,
            cancel: cancel.clone(),
        });

        let initial = tokio::spawn(initial_pull(self.source.clone(), sink.clone()));
        let connection = tokio::spawn(run_connection(self.config, self.source, sink));

        TransportHandle {
            events: Some(events_rx),
            connected: connected_rx,
            state: state_rx,
            cancel,
            tasks: vec![initial, connection],
        }
    }
}

/// Handle to a running Transport Manager.
pub struct TransportHandle {
    events: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    connected: watch::Receiver<bool>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TransportHandle {
    /// Take the event stream. Only the first call returns `Some`.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.events.take()
    }

    /// True while the most recent live message or pull succeeded.
    pub fn connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Release timers and close the live channel. Safe to call repeatedly.
    ///
    /// Once this returns no further event will be emitted.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(%e, "Transport task ended abnormally");
                }
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Single publication point for events, connectivity, and mode.
struct EventSink {
    events: mpsc::UnboundedSender<SyncEvent>,
    connected: watch::Sender<bool>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl EventSink {
    fn emit(&self, event: SyncEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Receiver gone means nobody is listening; not an error
        let _ = self.events.send(event);
    }

    fn set_connected(&self, connected: bool) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    fn set_state(&self, state: ConnectionState) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

/// One best-effort pull so first paint does not wait on the live channel.
async fn initial_pull(source: Arc<dyn SurfaceSource>, sink: Arc<EventSink>) {
    let result = tokio::select! {
        _ = sink.cancel.cancelled() => return,
        r = source.fetch_snapshot() => r,
    };

    match result {
        Ok(surfaces) => {
            debug!(surfaces = surfaces.len(), "Initial snapshot pulled");
            sink.set_connected(true);
            sink.emit(SyncEvent::Snapshot(surfaces));
        }
        Err(e) => debug!(%e, "Initial snapshot pull failed"),
    }
}

async fn run_connection(
    config: TransportConfig,
    source: Arc<dyn SurfaceSource>,
    sink: Arc<EventSink>,
) {
    let mut machine = ConnectionMachine::new(config.failure_threshold, config.reconnect_delay());

    loop {
        sink.set_state(machine.state());

        let opened = tokio::select! {
            _ = sink.cancel.cancelled() => return,
            r = source.open_live() => r,
        };

        match opened {
            Ok(feed) => {
                machine.on_open();
                info!(state = %machine.state(), "Live channel connected");
                sink.set_state(machine.state());
                sink.set_connected(true);

                if pump_live(feed, &sink).await.is_break() {
                    return;
                }
            }
            Err(e) => warn!(%e, "Live channel failed to open"),
        }

        sink.set_connected(false);
        let transition = machine.on_closed();
        sink.set_state(machine.state());

        match transition {
            Transition::Reconnect(delay) => {
                info!(
                    failures = machine.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "Live channel closed, reconnecting"
                );
                tokio::select! {
                    _ = sink.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Transition::Degrade => {
                warn!(
                    failures = machine.failures(),
                    poll_ms = config.poll_interval_ms,
                    "Live channel unreliable, falling back to polling"
                );
                poll_forever(config.poll_interval(), source, &sink).await;
                return;
            }
        }
    }
}

/// Forward live messages until the channel closes (`Continue`) or the manager stops (`Break`).
async fn pump_live(mut feed: LiveFeed, sink: &EventSink) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    loop {
        let frame = tokio::select! {
            biased;
            _ = sink.cancel.cancelled() => return ControlFlow::Break(()),
            frame = feed.next() => frame,
        };

        match frame {
            Some(Ok(text)) => match CanvasMessage::parse(&text) {
                Some(msg) => {
                    let event = msg.into_event();
                    debug!(event = event.label(), "Live message");
                    sink.set_connected(true);
                    sink.emit(event);
                }
                None => debug!(len = text.len(), "Dropping malformed canvas message"),
            },
            Some(Err(e)) => {
                warn!(%e, "Live channel error");
                return ControlFlow::Continue(());
            }
            None => return ControlFlow::Continue(()),
        }
    }
}

/// Degraded mode: pull on a fixed interval, forever.
async fn poll_forever(interval: Duration, source: Arc<dyn SurfaceSource>, sink: &EventSink) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sink.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = sink.cancel.cancelled() => return,
            r = source.fetch_snapshot() => r,
        };

        match result {
            Ok(surfaces) => {
                debug!(surfaces = surfaces.len(), "Poll succeeded");
                sink.set_connected(true);
                sink.emit(SyncEvent::Snapshot(surfaces));
            }
            Err(e) => {
                warn!(%e, "Poll failed");
                sink.set_connected(false);
            }
        }
    }
}
