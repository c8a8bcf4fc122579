//! Post model and request types.
//!
//! `likes` and `saves` are membership sets over user ids; all counts exposed to
//! callers are the length of the stored set, never a separately maintained
//! counter.

use serde::{Deserialize, Serialize};

use super::{AuthorInfo, CommentView};

/// A post as stored, with raw membership sets.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub likes: Vec<String>,
    pub saves: Vec<String>,
    pub comments: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A post as returned to callers, with interaction flags for the current user
/// and the most recent comments inlined.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorInfo>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    pub is_liked: bool,
    pub is_saved: bool,
    pub like_count: usize,
    pub comment_count: usize,
    pub save_count: usize,
    pub comments: Vec<CommentView>,
    pub created_at: String,
    pub updated_at: String,
}

impl PostView {
    /// Shape a stored post for the given caller (or an anonymous reader).
    pub fn new(
        post: Post,
        author: Option<AuthorInfo>,
        recent_comments: Vec<CommentView>,
        viewer: Option<&str>,
    ) -> Self {
        let is_liked = viewer.is_some_and(|id| post.likes.iter().any(|l| l == id));
        let is_saved = viewer.is_some_and(|id| post.saves.iter().any(|s| s == id));

        Self {
            id: post.id,
            author,
            content: post.content,
            image_url: post.image_url,
            link_url: post.link_url,
            is_liked,
            is_saved,
            like_count: post.likes.len(),
            comment_count: post.comments.len(),
            save_count: post.saves.len(),
            comments: recent_comments,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Request body for creating a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
}

/// Request body for updating a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
}

/// Result of a like toggle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub is_liked: bool,
    pub like_count: usize,
}

/// Result of a save toggle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    pub is_saved: bool,
    pub save_count: usize,
}
