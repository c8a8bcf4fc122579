//! Authentication and profile endpoints.

use axum::{extract::State, Extension, Json};

use super::{require_admin, require_user, ApiResponse, ApiResult};
use crate::auth::{self, CurrentUser};
use crate::errors::AppError;
use crate::models::{
    AdminSignupRequest, AdminVerification, AuthPayload, LoginRequest, Role, SignupRequest,
    UpdateProfileRequest, User,
};
use crate::AppState;

fn validate_signup(username: &str, email: &str, password: &str, bio: Option<&str>) -> Result<(), AppError> {
    if username.len() < 3 || username.len() > 30 {
        return Err(AppError::Validation(
            "Username must be between 3 and 30 characters".to_string(),
        ));
    }
    if !email.contains('@') || email.trim().is_empty() {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if password.len() < 6 {
        return Err(AppError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if bio.is_some_and(|b| b.len() > 500) {
        return Err(AppError::Validation(
            "Bio cannot exceed 500 characters".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/auth/user/signup - Register a new user.
pub async fn user_signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<AuthPayload> {
    validate_signup(
        &request.username,
        &request.email,
        &request.password,
        request.bio.as_deref(),
    )?;

    let password_hash = auth::hash_password(&request.password)?;
    let user = state
        .repo
        .create_user(&request, &password_hash, Role::User, false)
        .await?;
    let tokens = auth::issue_tokens(&user, &state.config)?;

    Ok(ApiResponse::created(
        "User registered successfully",
        AuthPayload { user, tokens },
    ))
}

/// POST /api/auth/user/login - Log a user in.
pub async fn user_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthPayload> {
    let user = state.repo.get_user_by_email(&request.email, None).await?;

    let user = match user {
        Some(user) if auth::verify_password(&request.password, &user.password_hash) => user,
        _ => {
            return Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ))
        }
    };

    let tokens = auth::issue_tokens(&user, &state.config)?;
    Ok(ApiResponse::ok(
        "Login successful",
        AuthPayload { user, tokens },
    ))
}

/// POST /api/auth/admin/signup - Register a new admin.
///
/// Requires a single-use, unexpired verification string generated by an
/// existing admin.
pub async fn admin_signup(
    State(state): State<AppState>,
    Json(request): Json<AdminSignupRequest>,
) -> ApiResult<AuthPayload> {
    validate_signup(
        &request.username,
        &request.email,
        &request.password,
        request.bio.as_deref(),
    )?;

    let verification_id = state
        .repo
        .find_valid_verification(&request.verification_string)
        .await?
        .ok_or_else(|| {
            AppError::Validation("Invalid or expired verification string".to_string())
        })?;

    let signup = SignupRequest {
        username: request.username,
        email: request.email,
        password: request.password,
        bio: request.bio,
    };
    let password_hash = auth::hash_password(&signup.password)?;
    let user = state
        .repo
        .create_user(&signup, &password_hash, Role::Admin, true)
        .await?;

    state
        .repo
        .mark_verification_used(&verification_id, &user.id)
        .await?;

    let tokens = auth::issue_tokens(&user, &state.config)?;
    Ok(ApiResponse::created(
        "Admin registered successfully",
        AuthPayload { user, tokens },
    ))
}

/// POST /api/auth/admin/login - Log an admin in.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthPayload> {
    let user = state
        .repo
        .get_user_by_email(&request.email, Some(Role::Admin))
        .await?;

    let user = match user {
        Some(user) if auth::verify_password(&request.password, &user.password_hash) => user,
        _ => {
            return Err(AppError::Authentication(
                "Invalid admin credentials".to_string(),
            ))
        }
    };

    let tokens = auth::issue_tokens(&user, &state.config)?;
    Ok(ApiResponse::ok(
        "Admin login successful",
        AuthPayload { user, tokens },
    ))
}

/// POST /api/auth/admin/generate-verification - Mint an admin signup string.
pub async fn generate_admin_verification(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> ApiResult<AdminVerification> {
    let admin = require_admin(&current_user)?;

    let verification = state.repo.create_admin_verification(&admin.id).await?;
    Ok(ApiResponse::created(
        "Admin verification string generated successfully",
        verification,
    ))
}

/// GET /api/auth/profile - Fetch the caller's profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> ApiResult<User> {
    let user = require_user(&current_user)?;

    let profile = state
        .repo
        .get_user(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok("Profile retrieved successfully", profile))
}

/// PUT /api/auth/profile - Update the caller's profile.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    let user = require_user(&current_user)?;

    if let Some(username) = &request.username {
        if username.len() < 3 || username.len() > 30 {
            return Err(AppError::Validation(
                "Username must be between 3 and 30 characters".to_string(),
            ));
        }
    }
    if request.bio.as_deref().is_some_and(|b| b.len() > 500) {
        return Err(AppError::Validation(
            "Bio cannot exceed 500 characters".to_string(),
        ));
    }

    let profile = state.repo.update_profile(&user.id, &request).await?;
    Ok(ApiResponse::ok("Profile updated successfully", profile))
}
