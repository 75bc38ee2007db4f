use crate::models::UrlView;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ViewerId = Uuid;

/// Events pushed to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full list, newest first.
    Urls(Vec<UrlView>),
    ProcessingUrl {
        #[serde(rename = "originalUrl")]
        original_url: String,
    },
    UrlCreated(UrlView),
    UrlDeleted {
        id: i64,
    },
    UrlClicked {
        id: i64,
        clicks: i64,
    },
    Error {
        message: String,
    },
}

/// Requests sent by viewers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    GetUrls,
    NewUrl {
        #[serde(rename = "originalUrl", alias = "url")]
        original_url: String,
    },
    DeleteUrl {
        id: i64,
    },
}

/// A published event and the viewer that caused it, if any.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<ViewerId>,
    pub event: ServerEvent,
}

impl Envelope {
    /// Whether `viewer` should receive this envelope.
    pub fn is_for(&self, viewer: ViewerId) -> bool {
        self.origin != Some(viewer)
    }
}

/// Broadcast channel shared by all realtime sessions.
///
/// Every state change is published here as an [`Envelope`]. Each WebSocket
/// session subscribes and forwards envelopes to its client as JSON text
/// frames of the form `{"event": <name>, "data": <payload>}`, skipping the
/// ones it published itself.
#[derive(Clone, Debug)]
pub struct Hub {
    sender: broadcast::Sender<Envelope>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every viewer except `origin`.
    pub fn publish(&self, origin: Option<ViewerId>, event: ServerEvent) {
        if self.sender.send(Envelope { origin, event }).is_err() {
            tracing::trace!("No viewers connected, event dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Number of subscribed sessions.
    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
