//! Real-time chat fan-out.
//!
//! Persisted chat activity is re-broadcast to all currently connected
//! listeners over a `tokio::sync::broadcast` channel and delivered as
//! Server-Sent Events. Delivery is at-most-once and best-effort: a listener
//! connecting after an event was sent only sees it through the paginated
//! history fetch.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::models::{ChatMessageView, MessageLikes};
use crate::AppState;

/// Capacity of the chat broadcast channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// Events fanned out to chat listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ChatEvent {
    NewMessage(ChatMessageView),
    NewReply(ChatMessageView),
    MessageLiked(MessageLikes),
    MessageDeleted { message_id: String },
}

impl ChatEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage(_) => "new-message",
            ChatEvent::NewReply(_) => "new-reply",
            ChatEvent::MessageLiked(_) => "message-liked",
            ChatEvent::MessageDeleted { .. } => "message-deleted",
        }
    }
}

/// Sender half of the chat broadcast channel, shared through `AppState`.
pub type ChatBroadcast = broadcast::Sender<ChatEvent>;

/// Fire-and-forget broadcast of a chat event.
///
/// Returns the number of subscribers that received it; having none is not an
/// error.
pub fn broadcast_event(tx: &ChatBroadcast, event: ChatEvent) -> usize {
    match tx.send(event) {
        Ok(subscriber_count) => {
            tracing::debug!("Chat event broadcast to {} subscribers", subscriber_count);
            subscriber_count
        }
        Err(_) => {
            tracing::debug!("No subscribers for chat event");
            0
        }
    }
}

/// GET /api/chat/stream - Subscribe to chat events over SSE.
pub async fn chat_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.chat_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(event.name()).data(data)))
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                // Lagged listeners skip missed events rather than disconnect
                tracing::debug!("SSE listener lagged, skipped {} events", skipped);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_with_subscriber() {
        let (tx, mut rx) = broadcast::channel::<ChatEvent>(8);

        let count = broadcast_event(
            &tx,
            ChatEvent::MessageDeleted {
                message_id: "m1".to_string(),
            },
        );

        assert_eq!(count, 1);
        match rx.recv().await.unwrap() {
            ChatEvent::MessageDeleted { message_id } => assert_eq!(message_id, "m1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_not_an_error() {
        let (tx, _) = broadcast::channel::<ChatEvent>(8);
        drop(tx.subscribe());

        let count = broadcast_event(
            &tx,
            ChatEvent::MessageDeleted {
                message_id: "m1".to_string(),
            },
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn test_event_names() {
        let event = ChatEvent::MessageLiked(MessageLikes {
            message_id: "m1".to_string(),
            likes: 3,
        });
        assert_eq!(event.name(), "message-liked");
    }
}
