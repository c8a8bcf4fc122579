//! Todo endpoints: an owner-scoped ordered list with dense positions.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use super::{require_user, ApiResponse, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    BulkUpdateResult, BulkUpdateTodosRequest, CreateTodoRequest, Priority, Todo, TodoStats,
    UpdatePositionRequest, UpdateTodoRequest,
};
use crate::pagination::{PageParams, PageQuery, Pagination};
use crate::AppState;

/// Query parameters for the todo listing: pagination plus filters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_before: Option<String>,
}

fn validate_todo_fields(
    title: Option<&str>,
    content: Option<&str>,
    tags: Option<&[String]>,
) -> Result<(), AppError> {
    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Todo title is required".to_string()));
        }
        if title.len() > 200 {
            return Err(AppError::Validation(
                "Title cannot exceed 200 characters".to_string(),
            ));
        }
    }
    if content.is_some_and(|c| c.len() > 2000) {
        return Err(AppError::Validation(
            "Content cannot exceed 2000 characters".to_string(),
        ));
    }
    if let Some(tags) = tags {
        if tags.iter().any(|t| t.len() > 50) {
            return Err(AppError::Validation(
                "Tag cannot exceed 50 characters".to_string(),
            ));
        }
    }
    Ok(())
}

/// GET /api/todos - List the caller's todos in list order.
pub async fn get_todos(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<TodoListQuery>,
) -> ApiResult<Vec<Todo>> {
    let user = require_user(&current_user)?;
    let params = PageParams::from_query(&query.page, "position");

    let completed = query.completed.as_deref().map(|c| c == "true");
    let priority = query.priority.as_deref().and_then(Priority::from_str);

    let (todos, total) = state
        .repo
        .list_todos(
            &user.id,
            &params,
            completed,
            priority,
            query.due_before.as_deref(),
        )
        .await?;

    Ok(ApiResponse::page(
        "Todos retrieved successfully",
        todos,
        Pagination::new(&params, total),
    ))
}

/// POST /api/todos - Create a todo at the end of the caller's list.
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Json(request): Json<CreateTodoRequest>,
) -> ApiResult<Todo> {
    let user = require_user(&current_user)?;

    validate_todo_fields(
        Some(&request.title),
        request.content.as_deref(),
        request.tags.as_deref(),
    )?;

    let todo = state.repo.create_todo(&user.id, &request).await?;
    Ok(ApiResponse::created("Todo created successfully", todo))
}

/// PUT /api/todos/{id} - Partially update a todo.
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTodoRequest>,
) -> ApiResult<Todo> {
    let user = require_user(&current_user)?;

    validate_todo_fields(
        request.title.as_deref(),
        request.content.as_deref(),
        request.tags.as_deref(),
    )?;

    let todo = state.repo.update_todo(&user.id, &id, &request).await?;
    Ok(ApiResponse::ok("Todo updated successfully", todo))
}

/// DELETE /api/todos/{id} - Delete a todo; later items shift down one.
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let user = require_user(&current_user)?;

    state.repo.delete_todo(&user.id, &id).await?;
    Ok(ApiResponse::message_only("Todo deleted successfully"))
}

/// PUT /api/todos/{id}/position - Move a todo within the caller's list.
pub async fn update_todo_position(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePositionRequest>,
) -> ApiResult<Todo> {
    let user = require_user(&current_user)?;

    if request.position < 0 {
        return Err(AppError::Validation(
            "Position must be a non-negative integer".to_string(),
        ));
    }

    let todo = state
        .repo
        .get_todo(&user.id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Todo not found".to_string()))?;

    if todo.position == request.position {
        return Ok(ApiResponse::ok("Todo position unchanged", todo));
    }

    let moved = state
        .repo
        .reposition_todo(&user.id, &id, request.position)
        .await?;

    Ok(ApiResponse::ok("Todo position updated successfully", moved))
}

/// GET /api/todos/stats - Per-owner todo statistics.
pub async fn get_todo_stats(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> ApiResult<TodoStats> {
    let user = require_user(&current_user)?;

    let stats = state.repo.todo_stats(&user.id).await?;
    Ok(ApiResponse::ok(
        "Todo statistics retrieved successfully",
        stats,
    ))
}

/// PATCH /api/todos/bulk - Patch several todos at once.
pub async fn bulk_update_todos(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Json(request): Json<BulkUpdateTodosRequest>,
) -> ApiResult<BulkUpdateResult> {
    let user = require_user(&current_user)?;

    if request.todo_ids.is_empty() {
        return Err(AppError::Validation(
            "Todo IDs array is required".to_string(),
        ));
    }
    if request.updates.is_empty() {
        return Err(AppError::Validation(
            "Updates object is required".to_string(),
        ));
    }

    validate_todo_fields(
        request.updates.title.as_deref(),
        request.updates.content.as_deref(),
        request.updates.tags.as_deref(),
    )?;

    let result = state
        .repo
        .bulk_update_todos(&user.id, &request.todo_ids, &request.updates)
        .await?;

    let message = format!("{} todos updated successfully", result.modified_count);
    Ok(ApiResponse::ok(&message, result))
}
