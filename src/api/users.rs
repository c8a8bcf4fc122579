//! User lookup and admin management endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{require_admin, ApiResponse, ApiResult};
use crate::auth::CurrentUser;
use crate::db::PostScope;
use crate::errors::AppError;
use crate::models::{PostView, Role, UpdateRoleRequest, User, UserStats};
use crate::pagination::{PageParams, PageQuery, Pagination};
use crate::AppState;

/// Query parameters for the admin user listing.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

/// A user profile with their post count attached.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub post_count: i64,
}

/// GET /api/users - List users (admin only).
pub async fn get_users(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<User>> {
    require_admin(&current_user)?;
    let params = PageParams::from_query(&query.page, "createdAt");

    let (users, total) = state
        .repo
        .list_users(&params, query.role.as_deref(), query.search.as_deref())
        .await?;

    Ok(ApiResponse::page(
        "Users retrieved successfully",
        users,
        Pagination::new(&params, total),
    ))
}

/// GET /api/users/{id} - Fetch a user's public profile.
pub async fn get_user_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserProfile> {
    let user = state
        .repo
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let post_count = state.repo.user_post_count(&id).await?;

    Ok(ApiResponse::ok(
        "User retrieved successfully",
        UserProfile { user, post_count },
    ))
}

/// GET /api/users/{id}/posts - List a user's posts.
pub async fn get_user_posts(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Vec<PostView>> {
    let params = PageParams::from_query(&query, "createdAt");

    state
        .repo
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let viewer = current_user.as_ref().map(|u| u.id.as_str());
    let (posts, total) = state
        .repo
        .list_posts(&params, PostScope::ByAuthor(&id), viewer)
        .await?;

    Ok(ApiResponse::page(
        "User posts retrieved successfully",
        posts,
        Pagination::new(&params, total),
    ))
}

/// PUT /api/users/{id}/role - Change a user's role (admin only).
pub async fn update_user_role(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<User> {
    let admin = require_admin(&current_user)?;

    let role = Role::from_str(&request.role)
        .ok_or_else(|| AppError::Validation("Invalid role specified".to_string()))?;

    if id == admin.id {
        return Err(AppError::Validation(
            "Cannot change your own role".to_string(),
        ));
    }

    let user = state.repo.update_user_role(&id, role).await?;
    Ok(ApiResponse::ok("User role updated successfully", user))
}

/// PATCH /api/users/{id}/status - Flip a user's verification status (admin only).
pub async fn toggle_user_status(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let admin = require_admin(&current_user)?;

    if id == admin.id {
        return Err(AppError::Validation(
            "Cannot change your own status".to_string(),
        ));
    }

    let user = state.repo.toggle_user_status(&id).await?;
    let message = if user.is_verified {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(ApiResponse::ok(message, user))
}

/// DELETE /api/users/{id} - Delete a user and their posts (admin only).
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let admin = require_admin(&current_user)?;

    if id == admin.id {
        return Err(AppError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    state.repo.delete_user(&id).await?;
    Ok(ApiResponse::message_only("User deleted successfully"))
}

/// GET /api/users/admin/stats - Platform statistics (admin only).
pub async fn get_user_stats(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> ApiResult<UserStats> {
    require_admin(&current_user)?;

    let stats = state.repo.get_user_stats().await?;
    Ok(ApiResponse::ok(
        "User statistics retrieved successfully",
        stats,
    ))
}
