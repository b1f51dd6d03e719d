//! End-to-end tests: a real canvas server (axum, REST + WebSocket) driven
//! through `HttpSurfaceSource` and `CanvasSession`.
//!
//! Run with: `cargo test -p surface-sync-canvas --test integration`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};

use surface_sync_canvas::{CanvasSession, DisplaySet};
use surface_sync_core::config::{Config, ServerConfig, TransportConfig};
use surface_sync_core::types::ConnectionState;
use surface_sync_transport::{HttpSurfaceSource, SurfaceSource};

/// Minimal stand-in for the canvas server.
#[derive(Clone)]
struct MockCanvas {
    surfaces: Arc<Mutex<Vec<Value>>>,
    callbacks: Arc<Mutex<Vec<Value>>>,
    broadcast: broadcast::Sender<String>,
}

impl MockCanvas {
    fn new(surfaces: Vec<Value>) -> Self {
        let (broadcast, _) = broadcast::channel(64);
        Self {
            surfaces: Arc::new(Mutex::new(surfaces)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            broadcast,
        }
    }

    fn render(&self, surface: Value) {
        let id = surface["id"].clone();
        {
            let mut surfaces = self.surfaces.lock().unwrap();
            match surfaces.iter_mut().find(|s| s["id"] == id) {
                Some(existing) => *existing = surface.clone(),
                None => surfaces.push(surface.clone()),
            }
        }
        let _ = self
            .broadcast
            .send(json!({"type": "render", "surface": surface}).to_string());
    }

    fn delete(&self, id: &str) {
        self.surfaces.lock().unwrap().retain(|s| s["id"] != id);
        let _ = self
            .broadcast
            .send(json!({"type": "delete", "id": id}).to_string());
    }

    /// Wait until a live client is listening for broadcasts.
    async fn wait_for_subscriber(&self) {
        for _ in 0..100 {
            if self.broadcast.receiver_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no live client subscribed");
    }

    fn callbacks(&self) -> Vec<Value> {
        self.callbacks.lock().unwrap().clone()
    }
}

async fn list_surfaces(State(canvas): State<MockCanvas>) -> Json<Vec<Value>> {
    Json(canvas.surfaces.lock().unwrap().clone())
}

async fn record_callback(State(canvas): State<MockCanvas>, Json(body): Json<Value>) -> Json<Value> {
    canvas.callbacks.lock().unwrap().push(body);
    Json(json!({"ok": true}))
}

async fn canvas_ws(ws: WebSocketUpgrade, State(canvas): State<MockCanvas>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(canvas, socket))
}

async fn handle_socket(canvas: MockCanvas, mut socket: WebSocket) {
    let mut rx = canvas.broadcast.subscribe();
    let init = json!({
        "type": "init",
        "surfaces": canvas.surfaces.lock().unwrap().clone(),
    });
    if socket.send(Message::Text(init.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Ok(text) = msg else { break };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
}

async fn start_mock(canvas: MockCanvas) -> String {
    let app = Router::new()
        .route("/api/canvas", get(list_surfaces))
        .route("/api/canvas/callback", post(record_callback))
        .route("/ws/canvas", get(canvas_ws))
        .with_state(canvas);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{addr}")
}

/// Find a port with nothing listening on it.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_config(base_url: String) -> Config {
    let mut config = Config::default();
    config.server = ServerConfig::with_base_url(base_url);
    config.transport.reconnect_delay_ms = 20;
    config.transport.poll_interval_ms = 50;
    config.canvas.exit_duration_ms = 100;
    config
}

async fn wait_for_display(
    rx: &mut watch::Receiver<Arc<DisplaySet>>,
    pred: impl FnMut(&Arc<DisplaySet>) -> bool,
) -> Arc<DisplaySet> {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("display never reached expected state")
        .expect("display channel closed")
        .clone()
}

#[tokio::test]
async fn test_http_snapshot_pull() {
    let base = start_mock(MockCanvas::new(vec![json!({
        "id": "a",
        "component": "Clock",
        "props": {},
        "callbackUrl": null,
        "updatedAt": "2026-01-01T00:00:00Z",
    })]))
    .await;

    let source =
        HttpSurfaceSource::new(ServerConfig::with_base_url(base), &TransportConfig::default())
            .unwrap();
    let surfaces = source.fetch_snapshot().await.unwrap();
    assert_eq!(surfaces.len(), 1);
    assert_eq!(surfaces[0].kind, "Clock");
    assert_eq!(surfaces[0].updated_at.as_deref(), Some("2026-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_http_snapshot_non_ok_is_error() {
    let base = start_mock(MockCanvas::new(Vec::new())).await;
    let mut server = ServerConfig::with_base_url(base);
    server.snapshot_path = "/api/missing".into();

    let source = HttpSurfaceSource::new(server, &TransportConfig::default()).unwrap();
    assert!(source.fetch_snapshot().await.is_err());
}

#[tokio::test]
async fn test_session_follows_server() {
    let canvas = MockCanvas::new(vec![json!({"id": "a", "component": "Clock", "props": {}})]);
    let base = start_mock(canvas.clone()).await;

    let mut session = CanvasSession::connect(fast_config(base)).unwrap();
    let mut display = session.subscribe();
    session.start();

    wait_for_display(&mut display, |set| set.get("a").is_some()).await;
    let mut state = session.watch_state().unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Live),
    )
    .await
    .expect("never went live")
    .unwrap();
    assert!(session.connected());
    canvas.wait_for_subscriber().await;

    canvas.render(json!({"id": "b", "component": "TaskCard", "props": {"title": "X"}}));
    canvas.render(json!({"id": "b", "component": "TaskCard", "props": {"title": "Y"}}));
    let set = wait_for_display(&mut display, |set| {
        set.get("b").is_some_and(|e| e.surface.props["title"] == "Y")
    })
    .await;
    assert_eq!(set.ids(), vec!["a", "b"]);

    canvas.delete("a");
    let set = wait_for_display(&mut display, |set| set.exiting().count() == 1).await;
    assert!(set.get("a").unwrap().exiting);

    let set = wait_for_display(&mut display, |set| set.get("a").is_none()).await;
    assert_eq!(set.ids(), vec!["b"]);

    session.stop().await;
}

#[tokio::test]
async fn test_callback_reaches_server() {
    let canvas = MockCanvas::new(Vec::new());
    let base = start_mock(canvas.clone()).await;

    let session = CanvasSession::connect(fast_config(base)).unwrap();
    let mut data = serde_json::Map::new();
    data.insert("reason".into(), json!("looks good"));
    assert!(session.callbacks().send("approve-1", "approve", data).await);

    let received = canvas.callbacks();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["surfaceId"], "approve-1");
    assert_eq!(received[0]["action"], "approve");
    assert_eq!(received[0]["data"]["reason"], "looks good");
}

#[tokio::test]
async fn test_unreachable_server_degrades_to_polling() {
    let port = find_free_port();
    let mut session = CanvasSession::connect(fast_config(format!("http://127.0.0.1:{port}"))).unwrap();
    session.start();

    let mut state = session.watch_state().unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::DegradedPolling),
    )
    .await
    .expect("never degraded")
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.connected());
    assert_eq!(session.connection_state(), Some(ConnectionState::DegradedPolling));
    assert!(session.display().is_empty());

    session.stop().await;
}
