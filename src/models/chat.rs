//! Chat message model, request types and the anonymous identity resolver.

use serde::{Deserialize, Serialize};

use super::AuthorInfo;

/// A chat message as stored.
///
/// `likes` is a bare counter, not a membership set: repeated likes from the
/// same caller are counted again.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub author_id: Option<String>,
    pub is_anonymous: bool,
    pub parent_id: Option<String>,
    pub replies: Vec<String>,
    pub likes: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A chat message as returned to callers, with inline replies for top-level
/// listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub content: String,
    pub author: Option<AuthorInfo>,
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message: Option<String>,
    pub reply_count: usize,
    pub likes: i64,
    pub replies: Vec<ChatMessageView>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatMessageView {
    /// Shape a stored message for callers.
    ///
    /// Masking is unconditional: whenever the record is flagged anonymous the
    /// author is nulled out here, regardless of what the row retains.
    pub fn new(
        message: ChatMessage,
        author: Option<AuthorInfo>,
        replies: Vec<ChatMessageView>,
    ) -> Self {
        let author = if message.is_anonymous { None } else { author };

        Self {
            id: message.id,
            content: message.content,
            author,
            is_anonymous: message.is_anonymous,
            parent_message: message.parent_id,
            reply_count: message.replies.len(),
            likes: message.likes,
            replies,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

/// Decide what author reference and anonymity flag to store for a write.
///
/// A request is stored anonymous when the caller asked for it or when there is
/// no authenticated caller at all; the author reference is only kept for
/// non-anonymous writes.
pub fn resolve_author(
    is_anonymous: bool,
    caller: Option<&str>,
) -> (Option<String>, bool) {
    let stored_anonymous = is_anonymous || caller.is_none();
    let author = if stored_anonymous {
        None
    } else {
        caller.map(String::from)
    };
    (author, stored_anonymous)
}

/// Request body for sending a message (or a reply via `parentMessage`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "default_anonymous")]
    pub is_anonymous: bool,
    #[serde(default)]
    pub parent_message: Option<String>,
}

fn default_anonymous() -> bool {
    true
}

/// Request body for replying to a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub content: String,
    #[serde(default = "default_anonymous")]
    pub is_anonymous: bool,
}

/// Result of liking a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLikes {
    pub message_id: String,
    pub likes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_authenticated_named() {
        assert_eq!(
            resolve_author(false, Some("u1")),
            (Some("u1".to_string()), false)
        );
    }

    #[test]
    fn test_resolver_authenticated_anonymous() {
        assert_eq!(resolve_author(true, Some("u1")), (None, true));
    }

    #[test]
    fn test_resolver_unauthenticated_is_always_anonymous() {
        assert_eq!(resolve_author(false, None), (None, true));
        assert_eq!(resolve_author(true, None), (None, true));
    }

    #[test]
    fn test_view_masks_author_for_anonymous_record() {
        // Row still holds an author from a prior state; the view must null it.
        let message = ChatMessage {
            id: "m1".to_string(),
            content: "hi".to_string(),
            author_id: Some("u1".to_string()),
            is_anonymous: true,
            parent_id: None,
            replies: vec![],
            likes: 0,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        };
        let author = Some(AuthorInfo {
            id: "u1".to_string(),
            username: "alice".to_string(),
            avatar: None,
        });
        let view = ChatMessageView::new(message, author, vec![]);
        assert!(view.author.is_none());
        assert!(view.is_anonymous);
    }
}
