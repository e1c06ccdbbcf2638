use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{hash_password, AuthenticatedUser, MessageResponse};
use crate::shared::error::ApiError;
use crate::shared::models::User;
use crate::shared::schema::{roles, user_roles, users};
use crate::shared::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

pub fn roles_for_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<String>> {
    user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq(user_id))
        .select(roles::name)
        .order(roles::name.asc())
        .load(conn)
}

/// Users holding a role with the given name. Reporting uses this to identify
/// the SUPPORT team.
pub fn users_with_role(conn: &mut PgConnection, role_name: &str) -> QueryResult<Vec<User>> {
    user_roles::table
        .inner_join(roles::table)
        .inner_join(users::table)
        .filter(roles::name.eq(role_name))
        .select(users::all_columns)
        .order(users::username.asc())
        .load(conn)
}

pub fn find_user(conn: &mut PgConnection, id: Uuid) -> Result<User, ApiError> {
    users::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("User not found with id: {id}")))
}

pub fn user_dto(conn: &mut PgConnection, user: User) -> Result<UserDto, ApiError> {
    let roles = roles_for_user(conn, user.id)?;
    Ok(UserDto {
        id: user.id,
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        roles,
    })
}

pub async fn get_all_users(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    let all: Vec<User> = users::table.order(users::username.asc()).load(&mut conn)?;
    let mut dtos = Vec::with_capacity(all.len());
    for user in all {
        dtos.push(user_dto(&mut conn, user)?);
    }
    Ok(Json(dtos))
}

pub async fn get_user(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDto>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;
    let user = find_user(&mut conn, id)?;
    Ok(Json(user_dto(&mut conn, user)?))
}

pub async fn update_user(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    let mut user = find_user(&mut conn, id)?;

    if user.username != req.username {
        let taken: i64 = users::table
            .filter(users::username.eq(&req.username))
            .count()
            .get_result(&mut conn)?;
        if taken > 0 {
            return Err(ApiError::BadRequest(
                "Error: Username is already taken!".to_string(),
            ));
        }
    }
    if user.email != req.email {
        let taken: i64 = users::table
            .filter(users::email.eq(&req.email))
            .count()
            .get_result(&mut conn)?;
        if taken > 0 {
            return Err(ApiError::BadRequest(
                "Error: Email is already in use!".to_string(),
            ));
        }
    }

    user.username = req.username;
    user.email = req.email;
    user.full_name = req.full_name;

    diesel::update(users::table.find(id))
        .set(&user)
        .execute(&mut conn)?;

    if let Some(role_names) = req.roles {
        let mut role_ids = Vec::with_capacity(role_names.len());
        for name in &role_names {
            let role_id: Option<Uuid> = roles::table
                .filter(roles::name.eq(name))
                .select(roles::id)
                .first(&mut conn)
                .optional()?;
            role_ids.push(role_id.ok_or_else(|| {
                ApiError::NotFound(format!("Role not found with name: {name}"))
            })?);
        }

        diesel::delete(user_roles::table.filter(user_roles::user_id.eq(id)))
            .execute(&mut conn)?;
        for role_id in role_ids {
            diesel::insert_into(user_roles::table)
                .values((user_roles::user_id.eq(id), user_roles::role_id.eq(role_id)))
                .execute(&mut conn)?;
        }
    }

    let user = find_user(&mut conn, id)?;
    Ok(Json(user_dto(&mut conn, user)?))
}

pub async fn delete_user(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    let user = find_user(&mut conn, id)?;
    diesel::delete(users::table.find(id)).execute(&mut conn)?;
    info!("deleted user {}", user.username);

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

pub async fn reset_password(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    find_user(&mut conn, id)?;
    let hash = hash_password(&req.new_password)?;
    diesel::update(users::table.find(id))
        .set(users::password_hash.eq(hash))
        .execute(&mut conn)?;

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

pub async fn add_user_role(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<UserDto>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    let user = find_user(&mut conn, user_id)?;
    let role_exists: i64 = roles::table
        .find(role_id)
        .count()
        .get_result(&mut conn)?;
    if role_exists == 0 {
        return Err(ApiError::NotFound(format!(
            "Role not found with id: {role_id}"
        )));
    }

    diesel::insert_into(user_roles::table)
        .values((
            user_roles::user_id.eq(user_id),
            user_roles::role_id.eq(role_id),
        ))
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    Ok(Json(user_dto(&mut conn, user)?))
}

pub async fn remove_user_role(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<UserDto>, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    let user = find_user(&mut conn, user_id)?;
    diesel::delete(
        user_roles::table
            .filter(user_roles::user_id.eq(user_id))
            .filter(user_roles::role_id.eq(role_id)),
    )
    .execute(&mut conn)?;

    Ok(Json(user_dto(&mut conn, user)?))
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(get_all_users))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/:id/reset-password", post(reset_password))
        .route(
            "/api/users/:user_id/roles/:role_id",
            put(add_user_role).delete(remove_user_role),
        )
}
