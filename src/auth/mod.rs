use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::shared::error::ApiError;
use crate::shared::models::User;
use crate::shared::schema::{user_roles, users};
use crate::shared::state::AppState;
use crate::users::{roles_for_user, user_dto, UserDto};

/// JWT claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(user: &User, roles: &[String], auth: &AuthConfig) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        email: user.email.clone(),
        roles: roles.to_vec(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(auth.jwt_expiry_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
}

pub fn decode_token(token: &str, auth: &AuthConfig) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            auth.to_lowercase()
                .starts_with("bearer ")
                .then(|| auth[7..].to_string())
        })
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn require_role(&self, role: &str) -> Result<(), ApiError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("requires {role} role")))
        }
    }

    pub fn require_any(&self, roles: &[&str]) -> Result<(), ApiError> {
        if roles.iter().any(|r| self.has_role(r)) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "requires one of: {}",
                roles.join(", ")
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("No authentication token".to_string()))?;

        let claims = decode_token(&token, &state.config.auth)?;
        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(AuthenticatedUser {
            user_id,
            username: claims.username,
            roles: claims.roles,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut conn = state.conn.get()?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&req.username))
        .first(&mut conn)
        .optional()?;

    let user = user.filter(|u| verify_password(&req.password, &u.password_hash)).ok_or_else(|| {
        ApiError::Unauthorized("Invalid username or password".to_string())
    })?;

    let roles = roles_for_user(&mut conn, user.id)?;
    let token = issue_token(&user, &roles, &state.config.auth)?;

    info!("user {} logged in", user.username);

    Ok(Json(AuthResponse {
        token,
        id: user.id,
        username: user.username,
        email: user.email,
        roles,
    }))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let mut conn = state.conn.get()?;

    let username_taken: i64 = users::table
        .filter(users::username.eq(&req.username))
        .count()
        .get_result(&mut conn)?;
    if username_taken > 0 {
        return Err(ApiError::BadRequest(
            "Error: Username is already taken!".to_string(),
        ));
    }

    let email_taken: i64 = users::table
        .filter(users::email.eq(&req.email))
        .count()
        .get_result(&mut conn)?;
    if email_taken > 0 {
        return Err(ApiError::BadRequest(
            "Error: Email is already in use!".to_string(),
        ));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: req.username,
        email: req.email,
        full_name: req.full_name,
        password_hash: hash_password(&req.password)?,
        created_at: Utc::now(),
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    // Every new account starts with the USER role.
    let role_id: Uuid = crate::shared::schema::roles::table
        .filter(crate::shared::schema::roles::name.eq("USER"))
        .select(crate::shared::schema::roles::id)
        .first(&mut conn)
        .map_err(|_| ApiError::Internal("Error: Role USER is not found.".to_string()))?;

    diesel::insert_into(user_roles::table)
        .values((
            user_roles::user_id.eq(user.id),
            user_roles::role_id.eq(role_id),
        ))
        .execute(&mut conn)?;

    info!("registered user {}", user.username);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully!".to_string(),
        }),
    ))
}

pub async fn list_users(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let mut conn = state.conn.get()?;

    let all: Vec<User> = users::table.order(users::username.asc()).load(&mut conn)?;
    let mut dtos = Vec::with_capacity(all.len());
    for user in all {
        dtos.push(user_dto(&mut conn, user)?);
    }
    Ok(Json(dtos))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/users", get(list_users))
}
