//! Anonymous chat endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{require_user, ApiResponse, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    resolve_author, ChatMessageView, MessageLikes, ReplyRequest, SendMessageRequest,
};
use crate::pagination::{PageParams, PageQuery, Pagination};
use crate::realtime::{broadcast_event, ChatEvent};
use crate::AppState;

fn validate_message_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::Validation(
            "Message content is required".to_string(),
        ));
    }
    if content.len() > 1000 {
        return Err(AppError::Validation(
            "Message cannot exceed 1000 characters".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/chat/messages - List top-level messages with recent replies.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<ChatMessageView>> {
    let params = PageParams::from_query(&query, "createdAt");

    let (messages, total) = state.repo.list_messages(&params).await?;

    Ok(ApiResponse::page(
        "Messages retrieved successfully",
        messages,
        Pagination::new(&params, total),
    ))
}

/// POST /api/chat/messages - Send a message; anonymous callers are welcome.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<ChatMessageView> {
    validate_message_content(&request.content)?;

    if let Some(parent_id) = &request.parent_message {
        state
            .repo
            .get_message(parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent message not found".to_string()))?;
    }

    let caller = current_user.as_ref().map(|u| u.id.as_str());
    let (author_id, is_anonymous) = resolve_author(request.is_anonymous, caller);

    let message = state
        .repo
        .create_message(
            request.content.trim(),
            author_id.as_deref(),
            is_anonymous,
            request.parent_message.as_deref(),
        )
        .await?;
    let is_reply = message.parent_id.is_some();
    let view = state.repo.shape_message(message).await?;

    let event = if is_reply {
        ChatEvent::NewReply(view.clone())
    } else {
        ChatEvent::NewMessage(view.clone())
    };
    broadcast_event(&state.chat_tx, event);

    Ok(ApiResponse::created("Message sent successfully", view))
}

/// POST /api/chat/messages/{id}/reply - Reply to a message.
pub async fn reply_to_message(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> ApiResult<ChatMessageView> {
    validate_message_content(&request.content)?;

    state
        .repo
        .get_message(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    let caller = current_user.as_ref().map(|u| u.id.as_str());
    let (author_id, is_anonymous) = resolve_author(request.is_anonymous, caller);

    let reply = state
        .repo
        .create_message(
            request.content.trim(),
            author_id.as_deref(),
            is_anonymous,
            Some(&id),
        )
        .await?;
    let view = state.repo.shape_message(reply).await?;

    broadcast_event(&state.chat_tx, ChatEvent::NewReply(view.clone()));

    Ok(ApiResponse::created("Reply sent successfully", view))
}

/// POST /api/chat/messages/{id}/like - Like a message.
pub async fn like_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageLikes> {
    let likes = state.repo.like_message(&id).await?;

    let result = MessageLikes {
        message_id: id,
        likes,
    };
    broadcast_event(&state.chat_tx, ChatEvent::MessageLiked(result.clone()));

    Ok(ApiResponse::ok("Message liked successfully", result))
}

/// DELETE /api/chat/messages/{id} - Delete a message and its replies.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let user = require_user(&current_user)?;

    let message = state
        .repo
        .get_message(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    // Anonymous messages have no owner to vouch for the delete
    if message.is_anonymous {
        if !user.is_admin() {
            return Err(AppError::Authorization(
                "Cannot delete anonymous messages unless you are an admin".to_string(),
            ));
        }
    } else if message.author_id.as_deref() != Some(user.id.as_str()) && !user.is_admin() {
        return Err(AppError::Authorization(
            "Not authorized to delete this message".to_string(),
        ));
    }

    state.repo.delete_message(&message).await?;

    broadcast_event(
        &state.chat_tx,
        ChatEvent::MessageDeleted {
            message_id: message.id,
        },
    );

    Ok(ApiResponse::message_only("Message deleted successfully"))
}

/// GET /api/chat/messages/{id}/replies - List a message's replies.
pub async fn get_message_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<ChatMessageView>> {
    let params = PageParams::from_query(&query, "createdAt");

    state
        .repo
        .get_message(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    let (replies, total) = state.repo.list_replies(&id, &params).await?;

    Ok(ApiResponse::page(
        "Replies retrieved successfully",
        replies,
        Pagination::new(&params, total),
    ))
}
