//! HTTP API server for showrun.
//!
//! Provides a REST API and WebSocket endpoint for querying and controlling
//! a running showrun runtime.
//!
//! # Endpoints
//!
//! - `GET /api/state` - runtime store snapshot with transition guards
//! - `GET /api/rundown` - rundown and derived metadata
//! - `POST /api/rundown` - apply a rundown edit
//! - `GET /api/restore` - restore point for the current playback
//! - `POST /api/{action}[/{args}]` - operator actions, same paths as OSC
//! - `GET /ws` - store updates as they change
//!
//! # Usage
//!
//! ```ignore
//! use showrun_http::start_server;
//!
//! let handle = runtime.handle().clone();
//! tokio::spawn(async move {
//!     start_server(handle, "0.0.0.0:4001".parse()?).await
//! });
//! ```

mod models;
mod routes;
mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use showrun_core::RuntimeHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use models::*;

/// Shared application state for HTTP handlers.
pub struct AppState {
    /// Runtime handle for state access and requests.
    pub handle: RuntimeHandle,
}

/// Build the router for a runtime.
pub fn router(handle: RuntimeHandle) -> Router {
    let state = Arc::new(AppState { handle });

    Router::new()
        // Reads
        .route("/api/state", get(routes::state::get_state))
        .route("/api/rundown", get(routes::state::get_rundown))
        .route("/api/restore", get(routes::state::get_restore_point))
        // Rundown edits
        .route("/api/rundown", post(routes::actions::edit_rundown))
        // Operator actions
        .route("/api/:action", post(routes::actions::post_action))
        .route(
            "/api/:action/*rest",
            post(routes::actions::post_action_with_args),
        )
        // WebSocket
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve the API on an already bound listener.
pub async fn serve(listener: TcpListener, handle: RuntimeHandle) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    log::info!("[HTTP] API server listening on http://{}", addr);
    axum::serve(listener, router(handle)).await?;
    Ok(())
}

/// Bind `addr` and serve the API until the task is dropped.
pub async fn start_server(handle: RuntimeHandle, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, handle).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::Value;
    use showrun_core::{
        AutomationSettings, EngineConfig, Entry, EventEntry, ManualClock, PlaybackEngine, Rundown,
        Runtime, StoreTag,
    };
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const HOUR: i64 = 3_600_000;

    fn start_runtime() -> Runtime {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rundown = Rundown::new("r", "Show");
        rundown.push(Entry::Event(
            EventEntry::new("a", 10 * HOUR, 600_000).with_cue("A1"),
        ));
        rundown.push(Entry::Event(EventEntry::new("b", 10 * HOUR + 600_000, 600_000)));
        let engine = PlaybackEngine::new(
            Arc::new(ManualClock::new(10 * HOUR)),
            EngineConfig::default(),
        )
        .with_rundown(rundown);
        Runtime::start(engine, AutomationSettings::default()).unwrap()
    }

    async fn spawn_server(runtime: &Runtime) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = runtime.handle().clone();
        tokio::spawn(async move { serve(listener, handle).await });
        format!("http://{}", addr)
    }

    async fn next_update(socket: &mut Socket) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("no websocket message in time")
                .expect("websocket closed")
                .unwrap();
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().unwrap()).unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_websocket_sync_then_changes() {
        let runtime = start_runtime();
        let base = spawn_server(&runtime).await;
        let url = format!("{}/ws", base.replacen("http", "ws", 1));
        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let mut tags = Vec::new();
        for _ in 0..StoreTag::ALL.len() {
            let update = next_update(&mut socket).await;
            tags.push(update["tag"].as_str().unwrap().to_string());
        }
        let mut expected: Vec<String> = StoreTag::ALL
            .iter()
            .map(|tag| serde_json::to_value(tag).unwrap().as_str().unwrap().to_string())
            .collect();
        tags.sort();
        expected.sort();
        assert_eq!(tags, expected);

        let response = reqwest::Client::new()
            .post(format!("{base}/api/start"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        loop {
            let update = next_update(&mut socket).await;
            if update["tag"] == "timer" && update["payload"]["playback"] == "play" {
                break;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_and_actions() {
        let runtime = start_runtime();
        let base = spawn_server(&runtime).await;
        let client = reqwest::Client::new();

        let state: Value = client
            .get(format!("{base}/api/state"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["timer"]["playback"], "stop");
        assert_eq!(state["guards"]["pause"], false);

        let response = client
            .post(format!("{base}/api/start/cue/A1"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["timer"]["playback"], "play");
        assert_eq!(body["eventNow"]["id"], "a");

        let response = client
            .post(format!("{base}/api/addtime/1m"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["timer"]["addedTime"], 60_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_errors_map_to_status() {
        let runtime = start_runtime();
        let base = spawn_server(&runtime).await;
        let client = reqwest::Client::new();

        let response = client.post(format!("{base}/api/dance")).send().await.unwrap();
        assert_eq!(response.status(), 400);
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.code, "bad_request");

        let response = client.post(format!("{base}/api/pause")).send().await.unwrap();
        assert_eq!(response.status(), 409);

        let response = client
            .post(format!("{base}/api/load/cue/ZZ"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rundown_edit() {
        let runtime = start_runtime();
        let base = spawn_server(&runtime).await;
        let client = reqwest::Client::new();

        let before: Value = client
            .get(format!("{base}/api/rundown"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let before = before["revision"].as_u64().unwrap();

        let response = client
            .post(format!("{base}/api/rundown"))
            .json(&serde_json::json!({ "op": "set_skip", "id": "b", "skip": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: EditResponse = response.json().await.unwrap();
        assert!(body.revision > before);

        let response = client
            .post(format!("{base}/api/rundown"))
            .json(&serde_json::json!({ "op": "remove", "ids": ["nope"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }
}
