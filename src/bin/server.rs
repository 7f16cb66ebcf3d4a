use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use mmo_world_rust_server::constants::{OUTBOUND_QUEUE_CAPACITY, RECONCILE_INTERVAL_MS};
use mmo_world_rust_server::hub::{now_ms, HubOptions, OutboundMessage, WorldHub};
use mmo_world_rust_server::protocol::parse_client_message;
use mmo_world_rust_server::store::WorldStore;
use rand::Rng as _;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedHub = Arc<Mutex<WorldHub>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative world server")]
struct Cli {
    /// Listen port; falls back to $PORT, then 8080.
    #[arg(long)]
    port: Option<u16>,
    /// World store location; falls back to $WORLD_DB_PATH.
    #[arg(long)]
    data_path: Option<PathBuf>,
    #[arg(long)]
    server_name: Option<String>,
    #[arg(long)]
    max_players: Option<usize>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let port = cli
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|value| value.parse().ok()))
        .unwrap_or(8080);
    let data_path = cli
        .data_path
        .or_else(|| std::env::var("WORLD_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".data/world.json"));
    let server_name = cli
        .server_name
        .or_else(|| std::env::var("SERVER_NAME").ok())
        .unwrap_or_else(|| "World Server".to_string());
    let max_players = cli
        .max_players
        .or_else(|| {
            std::env::var("MAX_PLAYERS")
                .ok()
                .and_then(|value| value.parse().ok())
        })
        .unwrap_or(1000);

    let store = WorldStore::new(data_path.clone());
    info!(
        "world store {} loaded ({} accounts, {} monsters)",
        data_path.display(),
        store.account_count(),
        store.monster_count()
    );

    let hub = Arc::new(Mutex::new(WorldHub::new(
        store,
        HubOptions {
            server_name,
            max_players,
            combat_seed: rand::rng().random(),
        },
    )));
    start_maintenance_loop(hub.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/server-info", get(server_info_handler))
        .route("/ws", get(ws_handler))
        .with_state(hub);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!("static file root: {}", static_dir.to_string_lossy());
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!("listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }
    let fallback = PathBuf::from("public");
    fallback.join("index.html").is_file().then_some(fallback)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn server_info_handler(State(hub): State<SharedHub>) -> impl IntoResponse {
    let mut guard = hub.lock().await;
    Json(guard.server_info())
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<SharedHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(hub, socket))
}

async fn handle_socket(hub: SharedHub, socket: WebSocket) {
    let conn_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);

    hub.lock().await.handle_connect(&conn_id, tx.clone());

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                dispatch_message(&hub, &conn_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    dispatch_message(&hub, &conn_id, text).await;
                } else {
                    let mut guard = hub.lock().await;
                    guard.handle_invalid_message(&conn_id, "invalid utf8 message");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.lock().await.handle_disconnect(&conn_id, "transport closed");
    drop(tx);
    let _ = writer.await;
}

async fn dispatch_message(hub: &SharedHub, conn_id: &str, raw: String) {
    match parse_client_message(&raw) {
        Ok(message) => {
            let mut guard = hub.lock().await;
            guard.handle_message(conn_id, message);
        }
        Err(reason) => {
            let mut guard = hub.lock().await;
            guard.handle_invalid_message(conn_id, &reason);
        }
    }
}

fn start_maintenance_loop(hub: SharedHub) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(RECONCILE_INTERVAL_MS));
        loop {
            interval.tick().await;
            let mut guard = hub.lock().await;
            let counts = guard.server_stats();
            guard.respawn_monsters(now_ms());
            debug!(
                "presence: connected={} authenticated={} in_world={}",
                counts.connected, counts.authenticated, counts.in_world
            );
        }
    });
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_id_is_monotonic_per_prefix() {
        let first = make_id("conn");
        let second = make_id("conn");
        assert_ne!(first, second);
        assert!(first.starts_with("conn_"));
        assert!(second.starts_with("conn_"));
    }
}
