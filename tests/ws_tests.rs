//! Realtime channel tests
//!
//! Serve the full router on a local port and talk to it over a real WebSocket.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, Stream, StreamExt};
use linkpulse::{config::AppConfig, db, AppState};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio_tungstenite::{connect_async, tungstenite::Message};

// =============================================================================
// Test Setup
// =============================================================================

async fn serve() -> (SocketAddr, Arc<AppState>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let state = Arc::new(AppState::new(AppConfig::default(), pool));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = linkpulse::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Next JSON text frame, skipping pings and other control frames.
async fn next_event<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_viewers(state: &AppState, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.hub.viewer_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer count never settled");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn viewer_gets_list_then_ack_then_created_record() {
    let (addr, state) = serve().await;
    state.urls.shorten("https://old.com", None).await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let first = next_event(&mut ws).await;
    assert_eq!(first["event"], "urls");
    assert_eq!(first["data"][0]["originalUrl"], "https://old.com");

    let request = json!({"event": "new_url", "data": {"originalUrl": "example.com"}});
    ws.send(Message::Text(request.to_string())).await.unwrap();

    let ack = next_event(&mut ws).await;
    assert_eq!(ack["event"], "processing_url");
    assert_eq!(ack["data"]["originalUrl"], "example.com");

    let created = next_event(&mut ws).await;
    assert_eq!(created["event"], "url_created");
    assert_eq!(created["data"]["originalUrl"], "https://example.com");
    assert!(created["data"]["shortUrl"].is_string());
}

#[tokio::test]
async fn other_viewers_see_creates_and_everyone_sees_deletes() {
    let (addr, state) = serve().await;
    let url = format!("ws://{addr}/ws");

    let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
    let (mut bob, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_event(&mut alice).await["event"], "urls");
    assert_eq!(next_event(&mut bob).await["event"], "urls");
    wait_for_viewers(&state, 2).await;

    let request = json!({"event": "new_url", "data": {"originalUrl": "https://shared.com"}});
    alice.send(Message::Text(request.to_string())).await.unwrap();
    assert_eq!(next_event(&mut alice).await["event"], "processing_url");
    let created = next_event(&mut alice).await;
    assert_eq!(created["event"], "url_created");

    let seen = next_event(&mut bob).await;
    assert_eq!(seen["event"], "url_created");
    assert_eq!(seen["data"]["id"], created["data"]["id"]);

    let delete = json!({"event": "delete_url", "data": {"id": created["data"]["id"]}});
    alice.send(Message::Text(delete.to_string())).await.unwrap();

    // Alice never got her own url_created twice, so her next frame is the delete.
    for ws in [&mut alice, &mut bob] {
        let deleted = next_event(ws).await;
        assert_eq!(deleted["event"], "url_deleted");
        assert_eq!(deleted["data"]["id"], created["data"]["id"]);
    }
}

#[tokio::test]
async fn closing_the_socket_ends_the_session() {
    let (addr, state) = serve().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    next_event(&mut ws).await;
    wait_for_viewers(&state, 1).await;

    ws.close(None).await.unwrap();
    wait_for_viewers(&state, 0).await;
}
