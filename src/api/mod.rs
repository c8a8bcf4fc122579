//! REST API module.
//!
//! Contains all route handlers and the response envelope shared by every
//! endpoint.

mod auth;
mod chat;
mod posts;
mod todos;
mod users;

pub use auth::*;
pub use chat::*;
pub use posts::*;
pub use todos::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::pagination::Pagination;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing)]
    code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 response with a payload.
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            status: "success",
            message: message.to_string(),
            data: Some(data),
            pagination: None,
            code: StatusCode::OK,
        }
    }

    /// 201 response with the created payload.
    pub fn created(message: &str, data: T) -> Self {
        Self {
            code: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }

    /// 200 response for a list endpoint with its pagination envelope.
    pub fn page(message: &str, data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(message, data)
        }
    }
}

impl ApiResponse<()> {
    /// 200 response without a payload.
    pub fn message_only(message: &str) -> Self {
        Self {
            status: "success",
            message: message.to_string(),
            data: None,
            pagination: None,
            code: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Require an authenticated caller.
pub fn require_user(user: &Option<CurrentUser>) -> Result<&CurrentUser, AppError> {
    user.as_ref()
        .ok_or_else(|| AppError::Authentication("Authentication required".to_string()))
}

/// Require an authenticated admin.
pub fn require_admin(user: &Option<CurrentUser>) -> Result<&CurrentUser, AppError> {
    let user = require_user(user)?;
    if !user.is_admin() {
        return Err(AppError::Authorization("Admin access required".to_string()));
    }
    Ok(user)
}
