//! Post and comment endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{require_user, ApiResponse, ApiResult};
use crate::auth::CurrentUser;
use crate::db::{PostScope, ToggleField};
use crate::errors::AppError;
use crate::models::{
    CommentView, CreateCommentRequest, CreatePostRequest, LikeStatus, PostView, SaveStatus,
    UpdatePostRequest,
};
use crate::pagination::{PageParams, PageQuery, Pagination};
use crate::AppState;

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("Content is required".to_string()));
    }
    if content.len() > 2000 {
        return Err(AppError::Validation(
            "Content cannot exceed 2000 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_url(url: Option<&str>, field: &str) -> Result<(), AppError> {
    if let Some(url) = url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Validation(format!(
                "{} must be a valid http(s) URL",
                field
            )));
        }
    }
    Ok(())
}

/// GET /api/posts - List posts, newest first by default.
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<PostView>> {
    let params = PageParams::from_query(&query, "createdAt");
    let viewer = current_user.as_ref().map(|u| u.id.as_str());

    let (posts, total) = state
        .repo
        .list_posts(&params, PostScope::All, viewer)
        .await?;

    Ok(ApiResponse::page(
        "Posts retrieved successfully",
        posts,
        Pagination::new(&params, total),
    ))
}

/// POST /api/posts - Create a new post.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<PostView> {
    let user = require_user(&current_user)?;

    validate_content(&request.content)?;
    validate_url(request.image_url.as_deref(), "imageUrl")?;
    validate_url(request.link_url.as_deref(), "linkUrl")?;

    let post = state.repo.create_post(&user.id, &request).await?;
    let view = state.repo.shape_post(post, Some(&user.id)).await?;

    Ok(ApiResponse::created("Post created successfully", view))
}

/// PUT /api/posts/{id} - Update a post.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePostRequest>,
) -> ApiResult<PostView> {
    let user = require_user(&current_user)?;

    let post = state
        .repo
        .get_post(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author_id != user.id && !user.is_admin() {
        return Err(AppError::Authorization(
            "Not authorized to update this post".to_string(),
        ));
    }

    if let Some(content) = &request.content {
        validate_content(content)?;
    }
    validate_url(request.image_url.as_deref(), "imageUrl")?;
    validate_url(request.link_url.as_deref(), "linkUrl")?;

    let updated = state.repo.update_post(&id, &request).await?;
    let view = state.repo.shape_post(updated, Some(&user.id)).await?;

    Ok(ApiResponse::ok("Post updated successfully", view))
}

/// DELETE /api/posts/{id} - Delete a post and its comments.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let user = require_user(&current_user)?;

    let post = state
        .repo
        .get_post(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author_id != user.id && !user.is_admin() {
        return Err(AppError::Authorization(
            "Not authorized to delete this post".to_string(),
        ));
    }

    state.repo.delete_post(&id).await?;
    Ok(ApiResponse::message_only("Post deleted successfully"))
}

/// POST /api/posts/{id}/like - Toggle the caller's like on a post.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<LikeStatus> {
    let user = require_user(&current_user)?;

    let (is_liked, like_count) = state
        .repo
        .toggle_membership(&id, &user.id, ToggleField::Likes)
        .await?;

    let message = if is_liked {
        "Post liked successfully"
    } else {
        "Post unliked successfully"
    };
    Ok(ApiResponse::ok(
        message,
        LikeStatus {
            is_liked,
            like_count,
        },
    ))
}

/// POST /api/posts/{id}/save - Toggle the caller's save on a post.
pub async fn toggle_save(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<SaveStatus> {
    let user = require_user(&current_user)?;

    let (is_saved, save_count) = state
        .repo
        .toggle_membership(&id, &user.id, ToggleField::Saves)
        .await?;

    let message = if is_saved {
        "Post saved successfully"
    } else {
        "Post unsaved successfully"
    };
    Ok(ApiResponse::ok(
        message,
        SaveStatus {
            is_saved,
            save_count,
        },
    ))
}

/// GET /api/posts/saved - List the caller's saved posts.
pub async fn get_saved_posts(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<PostView>> {
    let user = require_user(&current_user)?;
    let params = PageParams::from_query(&query, "createdAt");

    let (posts, total) = state
        .repo
        .list_posts(&params, PostScope::SavedBy(&user.id), Some(&user.id))
        .await?;

    Ok(ApiResponse::page(
        "Saved posts retrieved successfully",
        posts,
        Pagination::new(&params, total),
    ))
}

/// POST /api/posts/{id}/comments - Add a comment to a post.
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<CommentView> {
    let user = require_user(&current_user)?;

    if request.content.trim().is_empty() {
        return Err(AppError::Validation(
            "Comment content is required".to_string(),
        ));
    }
    if request.content.len() > 500 {
        return Err(AppError::Validation(
            "Comment cannot exceed 500 characters".to_string(),
        ));
    }

    let comment = state
        .repo
        .add_comment(&id, &user.id, &request.content)
        .await?;

    Ok(ApiResponse::created("Comment added successfully", comment))
}

/// GET /api/posts/{id}/comments - List a post's comments.
pub async fn get_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<CommentView>> {
    let params = PageParams::from_query(&query, "createdAt");

    state
        .repo
        .get_post(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let (comments, total) = state.repo.list_comments(&id, &params).await?;

    Ok(ApiResponse::page(
        "Comments retrieved successfully",
        comments,
        Pagination::new(&params, total),
    ))
}

/// DELETE /api/posts/comments/{id} - Delete a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let user = require_user(&current_user)?;

    let comment = state
        .repo
        .get_comment(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if comment.author_id != user.id && !user.is_admin() {
        return Err(AppError::Authorization(
            "Not authorized to delete this comment".to_string(),
        ));
    }

    state.repo.delete_comment(&comment).await?;
    Ok(ApiResponse::message_only("Comment deleted successfully"))
}
