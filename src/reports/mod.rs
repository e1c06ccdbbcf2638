//! Reporting endpoints for the support dashboards. Handlers load the raw
//! rows with diesel and hand them to the pure aggregation code in
//! [`analysis`] and [`scoring`].

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::error::ApiError;
use crate::shared::models::{Comment, Ticket, TicketStatus, User};
use crate::shared::schema::{ticket_comments, tickets, users};
use crate::shared::state::AppState;
use crate::users::{find_user, users_with_role};

pub mod analysis;
pub mod scoring;

use scoring::AgentActivity;

#[derive(Debug, Serialize)]
pub struct TicketTrends {
    pub labels: Vec<String>,
    pub created: Vec<i64>,
    pub resolved: Vec<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDistribution {
    pub status_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct PriorityAnalysis {
    #[serde(rename = "new")]
    pub new_tickets: BTreeMap<String, i64>,
    pub resolved: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub username: String,
    pub full_name: String,
    pub tickets_created: i64,
    pub tickets_resolved: i64,
    pub comments_added: i64,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub labels: Vec<String>,
    pub first_response_time: Vec<f64>,
    pub resolution_time: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaMetrics {
    pub average_first_response: String,
    pub average_resolution_time: String,
    #[serde(rename = "responseSLA")]
    pub response_sla: String,
    #[serde(rename = "resolutionSLA")]
    pub resolution_sla: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseTimeAnalysis {
    pub timeline: Timeline,
    pub metrics: SlaMetrics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsData {
    pub resolution_speed: i32,
    pub first_response_time: i32,
    pub tickets_resolved: i32,
    pub customer_satisfaction: i32,
    pub communication_quality: i32,
    pub ticket_quality: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsData {
    pub tickets_assigned: i64,
    pub tickets_resolved: i64,
    pub average_resolution_time: String,
    pub customer_satisfaction: String,
    pub response_rate: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub agent_name: String,
    pub metrics: MetricsData,
    pub team_average: MetricsData,
    pub stats: StatsData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: String,
    pub end_date: String,
}

impl DateRangeQuery {
    fn parse(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
        let start = parse_datetime(&self.start_date)?;
        let end = parse_datetime(&self.end_date)?;
        if start > end {
            return Err(ApiError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
        Ok((start, end))
    }
}

/// Accepts RFC 3339 or a bare ISO local datetime, treated as UTC.
fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ApiError::BadRequest(format!("invalid datetime: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub user_id: Option<Uuid>,
}

/// Comments for the given tickets, grouped per ticket in ascending creation
/// order. One query regardless of ticket count.
fn comments_grouped(
    conn: &mut PgConnection,
    ticket_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Comment>>, ApiError> {
    if ticket_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Comment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq_any(ticket_ids))
        .order(ticket_comments::created_at.asc())
        .load(conn)?;

    let mut grouped: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for row in rows {
        grouped.entry(row.ticket_id).or_default().push(row);
    }
    Ok(grouped)
}

fn load_agent_activity(
    conn: &mut PgConnection,
    agent: &User,
    since: DateTime<Utc>,
) -> Result<AgentActivity, ApiError> {
    let assigned: Vec<Ticket> = tickets::table
        .filter(tickets::assignee_id.eq(agent.id))
        .filter(tickets::created_at.gt(since))
        .load(conn)?;

    let authored_comments: Vec<Comment> = ticket_comments::table
        .filter(ticket_comments::author_id.eq(agent.id))
        .filter(ticket_comments::created_at.gt(since))
        .order(ticket_comments::created_at.asc())
        .load(conn)?;

    let ids: Vec<Uuid> = assigned.iter().map(|t| t.id).collect();
    let threads = comments_grouped(conn, &ids)?;

    Ok(AgentActivity {
        agent_id: agent.id,
        full_name: agent.full_name.clone(),
        assigned,
        authored_comments,
        ticket_comments: threads,
    })
}

pub async fn ticket_trends_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<TicketTrends>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let (start, end) = range.parse()?;
    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::created_at.between(start, end))
        .load(&mut conn)?;

    Ok(Json(analysis::ticket_trends(&rows, start, end)))
}

pub async fn status_distribution_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusDistribution>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table.load(&mut conn)?;
    Ok(Json(analysis::status_distribution(&rows)))
}

pub async fn priority_analysis_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PriorityAnalysis>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table.load(&mut conn)?;
    Ok(Json(analysis::priority_analysis(&rows, Utc::now())))
}

pub async fn user_activity_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<UserActivity>>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let days = query.days.unwrap_or(30).max(1);
    let window_start = Utc::now() - Duration::days(days);
    let mut conn = state.conn.get()?;

    let all_users: Vec<User> = users::table.order(users::username.asc()).load(&mut conn)?;

    let mut inputs = Vec::with_capacity(all_users.len());
    for user in all_users {
        let tickets_created: i64 = tickets::table
            .filter(tickets::creator_id.eq(user.id))
            .filter(tickets::created_at.gt(window_start))
            .count()
            .get_result(&mut conn)?;

        let resolved: Vec<Ticket> = tickets::table
            .filter(tickets::assignee_id.eq(user.id))
            .filter(tickets::status.eq_any(vec![TicketStatus::Resolved, TicketStatus::Closed]))
            .filter(tickets::updated_at.gt(window_start))
            .load(&mut conn)?;

        let comments: Vec<Comment> = ticket_comments::table
            .filter(ticket_comments::author_id.eq(user.id))
            .filter(ticket_comments::created_at.gt(window_start))
            .load(&mut conn)?;

        inputs.push(analysis::UserActivityInput {
            username: user.username,
            full_name: user.full_name,
            tickets_created,
            resolved,
            comments,
        });
    }

    Ok(Json(analysis::user_activity(inputs, window_start)))
}

pub async fn performance_metrics_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<PerformanceMetrics>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let since = Utc::now() - Duration::days(30);
    let mut conn = state.conn.get()?;

    let support_agents = users_with_role(&mut conn, "SUPPORT")?;
    let mut team_metrics = Vec::with_capacity(support_agents.len());
    for agent in &support_agents {
        let activity = load_agent_activity(&mut conn, agent, since)?;
        team_metrics.push(scoring::agent_metrics(&activity));
    }
    let team_average = scoring::team_average(&team_metrics);

    match query.user_id {
        Some(user_id) => {
            let agent = find_user(&mut conn, user_id)?;
            let activity = load_agent_activity(&mut conn, &agent, since)?;

            Ok(Json(PerformanceMetrics {
                agent_name: agent.full_name,
                metrics: scoring::agent_metrics(&activity),
                team_average,
                stats: scoring::agent_stats(&activity),
            }))
        }
        None => {
            let recent: Vec<Ticket> = tickets::table
                .filter(tickets::created_at.gt(since))
                .load(&mut conn)?;
            let ids: Vec<Uuid> = recent.iter().map(|t| t.id).collect();
            let threads = comments_grouped(&mut conn, &ids)?;

            Ok(Json(PerformanceMetrics {
                agent_name: "Team".to_string(),
                metrics: team_average,
                team_average,
                stats: scoring::team_stats(&recent, &threads),
            }))
        }
    }
}

pub async fn response_time_report(
    auth: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ResponseTimeAnalysis>, ApiError> {
    auth.require_any(&["ADMIN", "SUPPORT"])?;
    let (start, end) = range.parse()?;
    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::created_at.between(start, end))
        .load(&mut conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|t| t.id).collect();
    let threads = comments_grouped(&mut conn, &ids)?;

    Ok(Json(analysis::response_time_analysis(
        &rows, &threads, start, end,
    )))
}

pub fn configure_reports_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reports/ticket-trends", get(ticket_trends_report))
        .route(
            "/api/reports/status-distribution",
            get(status_distribution_report),
        )
        .route(
            "/api/reports/priority-analysis",
            get(priority_analysis_report),
        )
        .route("/api/reports/user-activity", get(user_activity_report))
        .route(
            "/api/reports/performance-metrics",
            get(performance_metrics_report),
        )
        .route("/api/reports/response-time", get(response_time_report))
}
