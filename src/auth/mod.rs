//! JWT-based authentication.
//!
//! Tokens are HS256-signed with the configured secret. The middleware is
//! deliberately optional: an absent or invalid token leaves the request
//! anonymous instead of failing it, because anonymous callers are first-class
//! on the chat endpoints. Handlers that need a caller enforce it themselves.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Role, TokenPair, User};

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Email
    pub email: String,
    /// Role ("user" or "admin")
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Authenticated caller identity attached to request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create a signed token for a user with the given lifetime.
pub fn create_token(user: &User, secret: &str, ttl_secs: u64) -> Result<String, AppError> {
    let now = unix_now();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        exp: now + ttl_secs,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| {
        tracing::error!("Failed to sign token: {:?}", e);
        AppError::Database("Failed to issue token".to_string())
    })
}

/// Issue the access/refresh token pair handed out at signup and login.
pub fn issue_tokens(user: &User, config: &Config) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        access_token: create_token(user, &config.jwt_secret, config.access_token_ttl)?,
        refresh_token: create_token(user, &config.jwt_secret, config.refresh_token_ttl)?,
    })
}

/// Verify and decode a token.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("Failed to hash password: {:?}", e);
        AppError::Database("Failed to process credentials".to_string())
    })
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Optional-auth middleware.
///
/// Decodes `Authorization: Bearer <token>` into `Option<CurrentUser>` and
/// attaches it to the request extensions. Requests without a usable token
/// proceed as anonymous.
pub async fn optional_auth(config: Arc<Config>, mut request: Request, next: Next) -> Response {
    let current_user = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .and_then(|token| verify_token(token, &config.jwt_secret))
        .and_then(|claims| {
            let role = Role::from_str(&claims.role)?;
            Some(CurrentUser {
                id: claims.sub,
                role,
            })
        });

    request.extensions_mut().insert(current_user);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            bio: String::new(),
            avatar: None,
            role: Role::Admin,
            is_verified: true,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = create_token(&test_user(), "secret", 3600).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let token = create_token(&test_user(), "secret", 3600).unwrap();
        assert!(verify_token(&token, "other-secret").is_none());
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
    }
}
