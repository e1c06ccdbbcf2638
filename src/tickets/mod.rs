use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::files::store_upload;
use crate::shared::error::ApiError;
use crate::shared::models::{
    Comment, ContentKind, Ticket, TicketContent, TicketPriority, TicketStatus,
};
use crate::shared::schema::{ticket_comments, tickets, users};
use crate::shared::state::AppState;
use crate::users::find_user;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDto {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub content: TicketContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creator_id: Uuid,
    pub creator_name: String,
    pub assignee_id: Option<Uuid>,
    pub assignee_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub assignee_id: Option<Uuid>,
    pub text_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub status: Option<TicketStatus>,
    /// Omitted keeps the current assignee; an explicit `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,
}

/// Keeps `null` distinguishable from an absent field: absent stays `None`
/// via the default, any present value (including `null`) becomes `Some`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct PriorityQuery {
    pub priority: TicketPriority,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeQuery {
    pub content_type: ContentKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignQuery {
    pub user_id: Uuid,
}

fn load_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket, ApiError> {
    tickets::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket not found with id: {id}")))
}

fn ticket_dto(conn: &mut PgConnection, ticket: Ticket) -> Result<TicketDto, ApiError> {
    let creator_name: String = users::table
        .find(ticket.creator_id)
        .select(users::full_name)
        .first(conn)?;

    let assignee_name = match ticket.assignee_id {
        Some(assignee_id) => Some(
            users::table
                .find(assignee_id)
                .select(users::full_name)
                .first(conn)?,
        ),
        None => None,
    };

    Ok(TicketDto {
        id: ticket.id,
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        priority: ticket.priority,
        status: ticket.status,
        content: ticket.content(),
        created_at: ticket.created_at,
        updated_at: ticket.updated_at,
        creator_id: ticket.creator_id,
        creator_name,
        assignee_id: ticket.assignee_id,
        assignee_name,
    })
}

fn comment_dto(conn: &mut PgConnection, comment: Comment) -> Result<CommentDto, ApiError> {
    let author_name: String = users::table
        .find(comment.author_id)
        .select(users::full_name)
        .first(conn)?;
    Ok(CommentDto {
        id: comment.id,
        ticket_id: comment.ticket_id,
        author_id: comment.author_id,
        author_name,
        content: comment.content,
        created_at: comment.created_at,
    })
}

fn dto_page(conn: &mut PgConnection, rows: Vec<Ticket>) -> Result<Vec<TicketDto>, ApiError> {
    let mut dtos = Vec::with_capacity(rows.len());
    for ticket in rows {
        dtos.push(ticket_dto(conn, ticket)?);
    }
    Ok(dtos)
}

pub async fn list_tickets(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn get_ticket(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDto>, ApiError> {
    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, id)?;
    Ok(Json(ticket_dto(&mut conn, ticket)?))
}

pub async fn create_ticket(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketDto>), ApiError> {
    let mut conn = state.conn.get()?;

    if let Some(assignee_id) = req.assignee_id {
        find_user(&mut conn, assignee_id)?;
    }

    let now = Utc::now();
    let mut ticket = Ticket {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        priority: req.priority.unwrap_or(TicketPriority::Medium),
        status: TicketStatus::Open,
        content_type: ContentKind::Text,
        text_content: None,
        image_path: None,
        audio_path: None,
        creator_id: auth.user_id,
        assignee_id: req.assignee_id,
        created_at: now,
        updated_at: now,
    };
    ticket.set_content(TicketContent::Text(req.text_content.unwrap_or_default()));

    diesel::insert_into(tickets::table)
        .values(&ticket)
        .execute(&mut conn)?;

    info!("ticket {} created by {}", ticket.id, auth.username);

    Ok((StatusCode::CREATED, Json(ticket_dto(&mut conn, ticket)?)))
}

pub async fn create_ticket_with_media(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TicketDto>), ApiError> {
    let mut title = None;
    let mut description = None;
    let mut priority = None;
    let mut kind = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(field_text(field).await?),
            "description" => description = Some(field_text(field).await?),
            "priority" => {
                let raw = field_text(field).await?;
                priority = Some(TicketPriority::parse(&raw).ok_or_else(|| {
                    ApiError::BadRequest(format!("invalid priority: {raw}"))
                })?);
            }
            "contentType" => {
                let raw = field_text(field).await?;
                kind = Some(ContentKind::parse(&raw).ok_or_else(|| {
                    ApiError::BadRequest(format!("invalid contentType: {raw}"))
                })?);
            }
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid file upload: {e}")))?;
                file = Some((file_name, data.to_vec()));
            }
            _ => {}
        }
    }

    let title = title.ok_or_else(|| ApiError::BadRequest("title is required".to_string()))?;
    let kind = kind.ok_or_else(|| ApiError::BadRequest("contentType is required".to_string()))?;

    let content = match kind {
        ContentKind::Text => TicketContent::Text(description.clone().unwrap_or_default()),
        ContentKind::Image | ContentKind::Audio => {
            let (file_name, data) = file.ok_or_else(|| {
                ApiError::BadRequest("file is required for media tickets".to_string())
            })?;
            let stored = store_upload(
                &state.config.storage.upload_dir,
                kind,
                file_name.as_deref(),
                &data,
            )
            .await
            .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;
            match kind {
                ContentKind::Image => TicketContent::Image(stored),
                _ => TicketContent::Audio(stored),
            }
        }
    };

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let mut ticket = Ticket {
        id: Uuid::new_v4(),
        title,
        description,
        priority: priority.unwrap_or(TicketPriority::Medium),
        status: TicketStatus::Open,
        content_type: ContentKind::Text,
        text_content: None,
        image_path: None,
        audio_path: None,
        creator_id: auth.user_id,
        assignee_id: None,
        created_at: now,
        updated_at: now,
    };
    ticket.set_content(content);

    diesel::insert_into(tickets::table)
        .values(&ticket)
        .execute(&mut conn)?;

    info!("media ticket {} created by {}", ticket.id, auth.username);

    Ok((StatusCode::CREATED, Json(ticket_dto(&mut conn, ticket)?)))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart field: {e}")))
}

pub async fn update_ticket(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketDto>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut ticket = load_ticket(&mut conn, id)?;

    if let Some(title) = req.title {
        ticket.title = title;
    }
    if let Some(description) = req.description {
        ticket.description = Some(description);
    }
    if let Some(priority) = req.priority {
        ticket.priority = priority;
    }
    if let Some(status) = req.status {
        ticket.status = status;
    }
    match req.assignee_id {
        Some(Some(assignee_id)) => {
            find_user(&mut conn, assignee_id)?;
            ticket.assignee_id = Some(assignee_id);
        }
        Some(None) => ticket.assignee_id = None,
        None => {}
    }
    ticket.updated_at = Utc::now();

    diesel::update(tickets::table.find(id))
        .set(&ticket)
        .execute(&mut conn)?;

    Ok(Json(ticket_dto(&mut conn, ticket)?))
}

pub async fn delete_ticket(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require_role("ADMIN")?;
    let mut conn = state.conn.get()?;

    load_ticket(&mut conn, id)?;
    diesel::delete(tickets::table.find(id)).execute(&mut conn)?;
    info!("ticket {id} deleted by {}", auth.username);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_ticket_status(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TicketDto>, ApiError> {
    let mut conn = state.conn.get()?;
    let mut ticket = load_ticket(&mut conn, id)?;

    ticket.status = query.status;
    ticket.updated_at = Utc::now();

    diesel::update(tickets::table.find(id))
        .set(&ticket)
        .execute(&mut conn)?;

    Ok(Json(ticket_dto(&mut conn, ticket)?))
}

pub async fn assign_ticket(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<AssignQuery>,
) -> Result<Json<TicketDto>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let mut conn = state.conn.get()?;

    let mut ticket = load_ticket(&mut conn, id)?;
    find_user(&mut conn, query.user_id)?;

    ticket.assignee_id = Some(query.user_id);
    ticket.updated_at = Utc::now();

    diesel::update(tickets::table.find(id))
        .set(&ticket)
        .execute(&mut conn)?;

    Ok(Json(ticket_dto(&mut conn, ticket)?))
}

pub async fn my_tickets(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::creator_id.eq(auth.user_id))
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn assigned_to_me(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::assignee_id.eq(auth.user_id))
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn tickets_by_status(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::status.eq(query.status))
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn tickets_by_priority(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriorityQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::priority.eq(query.priority))
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn tickets_by_content_type(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentTypeQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TicketDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::content_type.eq(query.content_type))
        .order(tickets::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .load(&mut conn)?;
    Ok(Json(dto_page(&mut conn, rows)?))
}

pub async fn list_comments(
    _auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    let mut conn = state.conn.get()?;
    load_ticket(&mut conn, ticket_id)?;

    let rows: Vec<Comment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;

    let mut dtos = Vec::with_capacity(rows.len());
    for comment in rows {
        dtos.push(comment_dto(&mut conn, comment)?);
    }
    Ok(Json(dtos))
}

pub async fn add_comment(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentDto>), ApiError> {
    let mut conn = state.conn.get()?;
    load_ticket(&mut conn, ticket_id)?;

    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("comment content is empty".to_string()));
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        ticket_id,
        author_id: auth.user_id,
        content: req.content,
        created_at: Utc::now(),
    };

    diesel::insert_into(ticket_comments::table)
        .values(&comment)
        .execute(&mut conn)?;

    Ok((StatusCode::CREATED, Json(comment_dto(&mut conn, comment)?)))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/with-media", axum::routing::post(create_ticket_with_media))
        .route("/api/tickets/my-tickets", get(my_tickets))
        .route("/api/tickets/assigned-to-me", get(assigned_to_me))
        .route("/api/tickets/by-status", get(tickets_by_status))
        .route("/api/tickets/by-priority", get(tickets_by_priority))
        .route("/api/tickets/by-content-type", get(tickets_by_content_type))
        .route(
            "/api/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/:id/status", put(update_ticket_status))
        .route("/api/tickets/:id/assign", put(assign_ticket))
        .route(
            "/api/tickets/:id/comments",
            get(list_comments).post(add_comment),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_assignee_is_not_a_clear() {
        let req: UpdateTicketRequest =
            serde_json::from_str(r#"{"title":"renamed"}"#).unwrap();
        assert_eq!(req.assignee_id, None);

        let req: UpdateTicketRequest =
            serde_json::from_str(r#"{"assigneeId":null}"#).unwrap();
        assert_eq!(req.assignee_id, Some(None));

        let id = Uuid::new_v4();
        let req: UpdateTicketRequest =
            serde_json::from_str(&format!(r#"{{"assigneeId":"{id}"}}"#)).unwrap();
        assert_eq!(req.assignee_id, Some(Some(id)));
    }
}
