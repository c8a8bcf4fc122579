//! Comment model and request types.

use serde::{Deserialize, Serialize};

use super::AuthorInfo;

/// A comment as stored. Comments always carry an author; there is no
/// anonymous mode for them.
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorInfo>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CommentView {
    pub fn new(comment: Comment, author: Option<AuthorInfo>) -> Self {
        Self {
            id: comment.id,
            post: comment.post_id,
            author,
            content: comment.content,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// Request body for adding a comment to a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
}
