use crate::{
    realtime::{ClientEvent, ServerEvent, ViewerId},
    AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{future, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use uuid::Uuid;

type Outbound = mpsc::Sender<ServerEvent>;
type Closed = mpsc::error::SendError<ServerEvent>;

/// GET /ws
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let viewer = Uuid::new_v4();
    tracing::info!("Viewer {} connected", viewer);

    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(64);

    // Single writer: everything bound for this client goes through `tx`.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode {:?}: {}", event, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let inbound = stream
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });

    run_session(&state, viewer, inbound, tx).await;

    if let Err(e) = writer.await {
        tracing::error!("Writer task for viewer {} failed: {:?}", viewer, e);
    }
    tracing::info!(
        "Viewer {} disconnected ({} still connected)",
        viewer,
        state.hub.viewer_count()
    );
}

/// Drive one viewer: send the full list, then interleave its requests with
/// hub broadcasts until either side goes away.
pub async fn run_session<S>(state: &AppState, viewer: ViewerId, inbound: S, outbound: Outbound)
where
    S: Stream<Item = String>,
{
    // Subscribe before the snapshot so nothing published in between is lost.
    let mut events = state.hub.subscribe();
    tracing::debug!("{} viewer(s) connected", state.hub.viewer_count());
    if send_snapshot(state, &outbound).await.is_err() {
        return;
    }

    let mut inbound = std::pin::pin!(inbound);
    loop {
        let sent = tokio::select! {
            frame = inbound.next() => match frame {
                Some(text) => handle_frame(state, viewer, &text, &outbound).await,
                None => break,
            },
            received = events.recv() => match received {
                Ok(envelope) if envelope.is_for(viewer) => outbound.send(envelope.event).await,
                Ok(_) => Ok(()),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Viewer {} lagged by {} event(s), resyncing", viewer, missed);
                    send_snapshot(state, &outbound).await
                }
                Err(RecvError::Closed) => break,
            },
        };

        if sent.is_err() {
            break;
        }
    }
}

async fn handle_frame(
    state: &AppState,
    viewer: ViewerId,
    text: &str,
    outbound: &Outbound,
) -> Result<(), Closed> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Viewer {} sent an unreadable frame: {}", viewer, e);
            return outbound
                .send(ServerEvent::Error {
                    message: format!("Invalid message: {e}"),
                })
                .await;
        }
    };

    match event {
        ClientEvent::GetUrls => {
            tracing::debug!("Viewer {} requested all URLs", viewer);
            send_snapshot(state, outbound).await
        }
        ClientEvent::NewUrl { original_url } => {
            outbound
                .send(ServerEvent::ProcessingUrl {
                    original_url: original_url.clone(),
                })
                .await?;

            // The requester always hears back; other viewers only on a new record.
            match state.urls.shorten(&original_url, Some(viewer)).await {
                Ok(shortened) => {
                    outbound
                        .send(ServerEvent::UrlCreated(state.urls.view(&shortened.record)))
                        .await
                }
                Err(e) => {
                    tracing::error!("Error creating short URL for {}: {}", original_url, e);
                    outbound.send(error_event(e)).await
                }
            }
        }
        ClientEvent::DeleteUrl { id } => match state.urls.delete(id).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Error deleting URL {}: {}", id, e);
                outbound.send(error_event(e)).await
            }
        },
    }
}

async fn send_snapshot(state: &AppState, outbound: &Outbound) -> Result<(), Closed> {
    match state.urls.list_views().await {
        Ok(urls) => outbound.send(ServerEvent::Urls(urls)).await,
        Err(e) => {
            tracing::error!("Error fetching URLs: {}", e);
            Ok(())
        }
    }
}

fn error_event(err: impl std::fmt::Display) -> ServerEvent {
    ServerEvent::Error {
        message: err.to_string(),
    }
}
