//! Agent performance scoring. Each dimension maps a raw measurement onto a
//! 30..=100 step scale, with 50 as the neutral score when there is no data.

use std::collections::HashMap;
use uuid::Uuid;

use crate::shared::models::{Comment, Ticket};

use super::analysis::{format_duration, hours_between, percentage};
use super::{MetricsData, StatsData};

/// Everything scored about one agent inside the 30-day window: the tickets
/// assigned to them, the comments they wrote, and the full comment threads
/// (ascending by creation) of their assigned tickets.
pub struct AgentActivity {
    pub agent_id: Uuid,
    pub full_name: String,
    pub assigned: Vec<Ticket>,
    pub authored_comments: Vec<Comment>,
    pub ticket_comments: HashMap<Uuid, Vec<Comment>>,
}

impl AgentActivity {
    fn resolved(&self) -> Vec<&Ticket> {
        self.assigned.iter().filter(|t| t.status.is_resolved()).collect()
    }
}

pub fn agent_metrics(activity: &AgentActivity) -> MetricsData {
    let resolved = activity.resolved();

    MetricsData {
        resolution_speed: resolution_speed_score(&resolved),
        first_response_time: first_response_score(activity),
        tickets_resolved: tickets_resolved_score(resolved.len()),
        customer_satisfaction: satisfaction_score(&resolved),
        communication_quality: communication_quality_score(activity),
        ticket_quality: ticket_quality_score(&resolved, &activity.ticket_comments),
    }
}

/// Integer mean of per-agent metrics. An empty team scores zero on every
/// dimension so the dashboard shows the gap rather than a fake neutral.
pub fn team_average(metrics: &[MetricsData]) -> MetricsData {
    if metrics.is_empty() {
        return MetricsData::default();
    }

    let count = metrics.len() as i32;
    MetricsData {
        resolution_speed: metrics.iter().map(|m| m.resolution_speed).sum::<i32>() / count,
        first_response_time: metrics.iter().map(|m| m.first_response_time).sum::<i32>() / count,
        tickets_resolved: metrics.iter().map(|m| m.tickets_resolved).sum::<i32>() / count,
        customer_satisfaction: metrics.iter().map(|m| m.customer_satisfaction).sum::<i32>()
            / count,
        communication_quality: metrics.iter().map(|m| m.communication_quality).sum::<i32>()
            / count,
        ticket_quality: metrics.iter().map(|m| m.ticket_quality).sum::<i32>() / count,
    }
}

pub fn agent_stats(activity: &AgentActivity) -> StatsData {
    let resolved = activity.resolved();

    let average_resolution_time = if resolved.is_empty() {
        "0 hours".to_string()
    } else {
        let total: f64 = resolved
            .iter()
            .map(|t| hours_between(t.created_at, t.updated_at))
            .sum();
        format_duration(total / resolved.len() as f64)
    };

    // Response rate counts assigned tickets where the agent's own first
    // comment landed within the 4-hour SLA.
    let mut responded = 0i64;
    for ticket in &activity.assigned {
        let first_own = activity
            .ticket_comments
            .get(&ticket.id)
            .and_then(|comments| comments.iter().find(|c| c.author_id == activity.agent_id));
        if let Some(comment) = first_own {
            if hours_between(ticket.created_at, comment.created_at) <= 4.0 {
                responded += 1;
            }
        }
    }

    StatsData {
        tickets_assigned: activity.assigned.len() as i64,
        tickets_resolved: resolved.len() as i64,
        average_resolution_time,
        customer_satisfaction: satisfaction_display(satisfaction_score(&resolved)),
        response_rate: percentage(responded, activity.assigned.len() as i64),
    }
}

/// Team-wide stats over all tickets created in the window, regardless of
/// assignee. First response here is the first comment from anyone.
pub fn team_stats(
    tickets: &[Ticket],
    comments_by_ticket: &HashMap<Uuid, Vec<Comment>>,
) -> StatsData {
    let resolved: Vec<&Ticket> = tickets.iter().filter(|t| t.status.is_resolved()).collect();

    let average_resolution_time = if resolved.is_empty() {
        "0 hours".to_string()
    } else {
        let total: f64 = resolved
            .iter()
            .map(|t| hours_between(t.created_at, t.updated_at))
            .sum();
        format_duration(total / resolved.len() as f64)
    };

    let mut responded = 0i64;
    for ticket in tickets {
        let first = comments_by_ticket
            .get(&ticket.id)
            .and_then(|comments| comments.first());
        if let Some(comment) = first {
            if hours_between(ticket.created_at, comment.created_at) <= 4.0 {
                responded += 1;
            }
        }
    }

    StatsData {
        tickets_assigned: tickets.len() as i64,
        tickets_resolved: resolved.len() as i64,
        average_resolution_time,
        customer_satisfaction: satisfaction_display(satisfaction_score(&resolved)),
        response_rate: percentage(responded, tickets.len() as i64),
    }
}

fn resolution_speed_score(resolved: &[&Ticket]) -> i32 {
    if resolved.is_empty() {
        return 50;
    }
    let total: f64 = resolved
        .iter()
        .map(|t| hours_between(t.created_at, t.updated_at))
        .sum();
    let avg_hours = total / resolved.len() as f64;

    match avg_hours {
        h if h < 4.0 => 100,
        h if h < 8.0 => 90,
        h if h < 16.0 => 80,
        h if h < 24.0 => 70,
        h if h < 36.0 => 60,
        h if h < 48.0 => 50,
        h if h < 72.0 => 40,
        _ => 30,
    }
}

fn first_response_score(activity: &AgentActivity) -> i32 {
    if activity.assigned.is_empty() {
        return 50;
    }

    let mut responded = 0usize;
    let mut total_hours = 0f64;
    for ticket in &activity.assigned {
        let first = activity
            .ticket_comments
            .get(&ticket.id)
            .and_then(|comments| comments.first());
        if let Some(comment) = first {
            total_hours += hours_between(ticket.created_at, comment.created_at);
            responded += 1;
        }
    }
    if responded == 0 {
        return 50;
    }
    let avg_hours = total_hours / responded as f64;

    match avg_hours {
        h if h < 0.5 => 100,
        h if h < 1.0 => 90,
        h if h < 2.0 => 80,
        h if h < 4.0 => 70,
        h if h < 6.0 => 60,
        h if h < 8.0 => 50,
        h if h < 12.0 => 40,
        _ => 30,
    }
}

fn tickets_resolved_score(resolved_count: usize) -> i32 {
    if resolved_count == 0 {
        return 50;
    }
    match resolved_count {
        n if n >= 40 => 100,
        n if n >= 30 => 90,
        n if n >= 25 => 80,
        n if n >= 20 => 70,
        n if n >= 15 => 60,
        n if n >= 10 => 50,
        n if n >= 5 => 40,
        _ => 30,
    }
}

/// Placeholder rating until real satisfaction surveys are wired in: a
/// deterministic 3..=5 derived from the ticket id, CLOSED tickets only.
pub fn placeholder_rating(id: Uuid) -> i32 {
    3 + (id.as_u128() % 3) as i32
}

fn satisfaction_score(resolved: &[&Ticket]) -> i32 {
    if resolved.is_empty() {
        return 50;
    }

    let mut total = 0i32;
    let mut rated = 0i32;
    for ticket in resolved {
        if ticket.status == crate::shared::models::TicketStatus::Closed {
            total += placeholder_rating(ticket.id);
            rated += 1;
        }
    }
    if rated == 0 {
        return 50;
    }
    let avg_rating = f64::from(total) / f64::from(rated);
    (avg_rating * 20.0) as i32
}

fn satisfaction_display(score: i32) -> String {
    format!("{:.1}/5", f64::from(score) / 20.0)
}

fn communication_quality_score(activity: &AgentActivity) -> i32 {
    if activity.authored_comments.is_empty() {
        return 50;
    }

    let comments_per_ticket = if activity.assigned.is_empty() {
        0.0
    } else {
        activity.authored_comments.len() as f64 / activity.assigned.len() as f64
    };

    let total_length: usize = activity
        .authored_comments
        .iter()
        .map(|c| c.content.len())
        .sum();
    let avg_length = total_length as f64 / activity.authored_comments.len() as f64;

    (frequency_score(comments_per_ticket) + length_score(avg_length)) / 2
}

fn frequency_score(comments_per_ticket: f64) -> i32 {
    match comments_per_ticket {
        f if f >= 5.0 => 100,
        f if f >= 4.0 => 90,
        f if f >= 3.0 => 80,
        f if f >= 2.5 => 70,
        f if f >= 2.0 => 60,
        f if f >= 1.5 => 50,
        f if f >= 1.0 => 40,
        _ => 30,
    }
}

fn length_score(avg_length: f64) -> i32 {
    match avg_length {
        l if l >= 200.0 => 100,
        l if l >= 150.0 => 90,
        l if l >= 120.0 => 80,
        l if l >= 100.0 => 70,
        l if l >= 80.0 => 60,
        l if l >= 60.0 => 50,
        l if l >= 40.0 => 40,
        _ => 30,
    }
}

/// A resolved ticket counts against quality when it sits in REOPENED, or when
/// its thread shows more than two status-churn comments.
fn ticket_quality_score(
    resolved: &[&Ticket],
    ticket_comments: &HashMap<Uuid, Vec<Comment>>,
) -> i32 {
    use crate::shared::models::TicketStatus;

    if resolved.is_empty() {
        return 50;
    }

    let mut reopened = 0usize;
    for ticket in resolved {
        let churned = ticket.status == TicketStatus::Resolved
            && has_status_churn(ticket_comments.get(&ticket.id).map_or(&[][..], Vec::as_slice));
        if ticket.status == TicketStatus::Reopened || churned {
            reopened += 1;
        }
    }
    let reopen_rate = reopened as f64 / resolved.len() as f64;

    match reopen_rate {
        r if r <= 0.01 => 100,
        r if r <= 0.03 => 90,
        r if r <= 0.05 => 80,
        r if r <= 0.08 => 70,
        r if r <= 0.12 => 60,
        r if r <= 0.15 => 50,
        r if r <= 0.20 => 40,
        _ => 30,
    }
}

fn has_status_churn(comments: &[Comment]) -> bool {
    let churn_comments = comments
        .iter()
        .filter(|c| c.content.contains("changed status") || c.content.contains("status update"))
        .count();
    churn_comments > 2
}

#[cfg(test)]
mod tests {
    use super::super::analysis::test_support::{comment, ticket};
    use super::*;
    use crate::shared::models::TicketStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn idle_agent() -> AgentActivity {
        AgentActivity {
            agent_id: Uuid::new_v4(),
            full_name: "Idle Agent".to_string(),
            assigned: vec![],
            authored_comments: vec![],
            ticket_comments: HashMap::new(),
        }
    }

    #[test]
    fn idle_agent_scores_neutral_everywhere() {
        let metrics = agent_metrics(&idle_agent());
        assert_eq!(metrics.resolution_speed, 50);
        assert_eq!(metrics.first_response_time, 50);
        assert_eq!(metrics.customer_satisfaction, 50);
        assert_eq!(metrics.communication_quality, 50);
        assert_eq!(metrics.ticket_quality, 50);
        assert_eq!(metrics.tickets_resolved, 50);
    }

    #[test]
    fn all_scores_stay_in_band() {
        let agent_id = Uuid::new_v4();
        let mut assigned = Vec::new();
        let mut ticket_comments = HashMap::new();
        let mut authored = Vec::new();
        for i in 0..6u32 {
            let t = ticket(TicketStatus::Closed, at(1 + i, 0), at(1 + i, 3));
            let c = comment(t.id, agent_id, at(1 + i, 1));
            authored.push(c.clone());
            ticket_comments.insert(t.id, vec![c]);
            assigned.push(t);
        }
        let activity = AgentActivity {
            agent_id,
            full_name: "Busy Agent".to_string(),
            assigned,
            authored_comments: authored,
            ticket_comments,
        };

        let metrics = agent_metrics(&activity);
        for score in [
            metrics.resolution_speed,
            metrics.first_response_time,
            metrics.tickets_resolved,
            metrics.customer_satisfaction,
            metrics.communication_quality,
            metrics.ticket_quality,
        ] {
            assert!((30..=100).contains(&score), "score {score} out of band");
        }
        // Sub-4h resolutions land the top resolution score; an exactly
        // one-hour first response sits on the 80 step.
        assert_eq!(metrics.resolution_speed, 100);
        assert_eq!(metrics.first_response_time, 80);
    }

    #[test]
    fn resolved_volume_scale() {
        assert_eq!(tickets_resolved_score(0), 50);
        assert_eq!(tickets_resolved_score(1), 30);
        assert_eq!(tickets_resolved_score(5), 40);
        assert_eq!(tickets_resolved_score(10), 50);
        assert_eq!(tickets_resolved_score(40), 100);
        assert_eq!(tickets_resolved_score(200), 100);
    }

    #[test]
    fn placeholder_rating_is_deterministic_and_bounded() {
        let id = Uuid::new_v4();
        let rating = placeholder_rating(id);
        assert!((3..=5).contains(&rating));
        assert_eq!(rating, placeholder_rating(id));
    }

    #[test]
    fn churned_resolution_drags_quality_down() {
        let agent_id = Uuid::new_v4();
        let t = ticket(TicketStatus::Resolved, at(1, 0), at(2, 0));
        let churn = vec![
            comment(t.id, agent_id, at(1, 1)),
            {
                let mut c = comment(t.id, agent_id, at(1, 2));
                c.content = "changed status to IN_PROGRESS".to_string();
                c
            },
            {
                let mut c = comment(t.id, agent_id, at(1, 3));
                c.content = "status update: back to OPEN".to_string();
                c
            },
            {
                let mut c = comment(t.id, agent_id, at(1, 4));
                c.content = "changed status to RESOLVED".to_string();
                c
            },
        ];
        let mut ticket_comments = HashMap::new();
        ticket_comments.insert(t.id, churn);

        assert_eq!(ticket_quality_score(&[&t], &ticket_comments), 30);

        let clean = ticket(TicketStatus::Resolved, at(1, 0), at(2, 0));
        assert_eq!(ticket_quality_score(&[&clean], &HashMap::new()), 100);
    }

    #[test]
    fn team_average_is_integer_mean_and_zero_when_empty() {
        assert_eq!(team_average(&[]), MetricsData::default());

        let a = MetricsData {
            resolution_speed: 100,
            first_response_time: 90,
            tickets_resolved: 50,
            customer_satisfaction: 80,
            communication_quality: 70,
            ticket_quality: 100,
        };
        let b = MetricsData {
            resolution_speed: 30,
            first_response_time: 30,
            tickets_resolved: 30,
            customer_satisfaction: 50,
            communication_quality: 50,
            ticket_quality: 30,
        };
        let avg = team_average(&[a, b]);
        assert_eq!(avg.resolution_speed, 65);
        assert_eq!(avg.tickets_resolved, 40);
        assert_eq!(avg.ticket_quality, 65);
    }

    #[test]
    fn agent_stats_counts_own_responses_only() {
        let agent_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t = ticket(TicketStatus::Open, at(1, 0), at(1, 0));
        // Someone else answered within SLA; the agent never did.
        let mut ticket_comments = HashMap::new();
        ticket_comments.insert(t.id, vec![comment(t.id, other, at(1, 1))]);

        let stats = agent_stats(&AgentActivity {
            agent_id,
            full_name: "Agent".to_string(),
            assigned: vec![t],
            authored_comments: vec![],
            ticket_comments,
        });
        assert_eq!(stats.response_rate, "0%");
        assert_eq!(stats.tickets_assigned, 1);
        assert_eq!(stats.average_resolution_time, "0 hours");
    }

    #[test]
    fn team_stats_uses_first_comment_from_anyone() {
        let author = Uuid::new_v4();
        let t = ticket(TicketStatus::Resolved, at(1, 0), at(1, 12));
        let mut comments = HashMap::new();
        comments.insert(t.id, vec![comment(t.id, author, at(1, 2))]);

        let stats = team_stats(&[t], &comments);
        assert_eq!(stats.response_rate, "100%");
        assert_eq!(stats.tickets_resolved, 1);
        assert_eq!(stats.average_resolution_time, "12.0 hours");
    }
}
