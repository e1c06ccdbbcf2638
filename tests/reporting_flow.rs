//! End-to-end reporting checks over an in-memory month of helpdesk traffic.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use ticketdesk::reports::analysis;
use ticketdesk::reports::scoring::{self, AgentActivity};
use ticketdesk::shared::models::{
    Comment, ContentKind, Ticket, TicketPriority, TicketStatus,
};

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, d, h, 0, 0).unwrap()
}

fn ticket(
    status: TicketStatus,
    priority: TicketPriority,
    assignee: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        title: "printer on fire".to_string(),
        description: Some("it beeps".to_string()),
        priority,
        status,
        content_type: ContentKind::Text,
        text_content: Some("it beeps loudly".to_string()),
        image_path: None,
        audio_path: None,
        creator_id: Uuid::new_v4(),
        assignee_id: assignee,
        created_at,
        updated_at,
    }
}

fn comment(ticket_id: Uuid, author_id: Uuid, created_at: DateTime<Utc>) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        ticket_id,
        author_id,
        content: "thanks for the report, checking the tray sensor now".to_string(),
        created_at,
    }
}

struct Month {
    tickets: Vec<Ticket>,
    threads: HashMap<Uuid, Vec<Comment>>,
    agent: Uuid,
}

fn busy_month() -> Month {
    let agent = Uuid::new_v4();
    let mut tickets = Vec::new();
    let mut threads = HashMap::new();

    // Twelve tickets over four weeks, answered within the hour and resolved
    // the same day.
    for week in 0..4u32 {
        for slot in 0..3u32 {
            let opened = day(1 + week * 7 + slot, 9);
            let t = ticket(
                TicketStatus::Closed,
                TicketPriority::Medium,
                Some(agent),
                opened,
                opened + Duration::hours(3),
            );
            threads.insert(t.id, vec![comment(t.id, agent, opened + Duration::minutes(20))]);
            tickets.push(t);
        }
    }

    // One unanswered ticket still open at month end.
    tickets.push(ticket(
        TicketStatus::Open,
        TicketPriority::High,
        Some(agent),
        day(25, 16),
        day(25, 16),
    ));

    Month { tickets, threads, agent }
}

#[test]
fn trends_account_for_every_in_window_ticket() {
    let month = busy_month();
    let trends = analysis::ticket_trends(&month.tickets, day(1, 0), day(30, 0));

    assert_eq!(trends.created.iter().sum::<i64>(), month.tickets.len() as i64);
    assert_eq!(trends.resolved.iter().sum::<i64>(), 12);
    assert_eq!(trends.labels.len(), trends.created.len());
}

#[test]
fn distribution_and_priorities_agree_with_the_raw_rows() {
    let month = busy_month();

    let distribution = analysis::status_distribution(&month.tickets);
    assert_eq!(distribution.status_counts["CLOSED"], 12);
    assert_eq!(distribution.status_counts["OPEN"], 1);
    assert_eq!(distribution.status_counts.values().sum::<i64>(), 13);

    let priorities = analysis::priority_analysis(&month.tickets, day(30, 0));
    assert_eq!(priorities.new_tickets["MEDIUM"], 12);
    assert_eq!(priorities.new_tickets["HIGH"], 1);
    assert_eq!(priorities.resolved["MEDIUM"], 12);
}

#[test]
fn sla_report_reflects_fast_responses() {
    let month = busy_month();
    let report =
        analysis::response_time_analysis(&month.tickets, &month.threads, day(1, 0), day(30, 0));

    // 12 of 13 answered within 4h, 12 of 13 resolved within 24h.
    assert_eq!(report.metrics.response_sla, "92%");
    assert_eq!(report.metrics.resolution_sla, "92%");
    assert_eq!(report.metrics.average_first_response, "20 minutes");
    assert_eq!(report.metrics.average_resolution_time, "3.0 hours");
}

#[test]
fn solo_agent_matches_the_team_average() {
    let month = busy_month();
    let activity = AgentActivity {
        agent_id: month.agent,
        full_name: "Ada".to_string(),
        assigned: month.tickets.clone(),
        authored_comments: month.threads.values().flatten().cloned().collect(),
        ticket_comments: month.threads.clone(),
    };

    let metrics = scoring::agent_metrics(&activity);
    assert_eq!(scoring::team_average(&[metrics]), metrics);

    // Fast same-day resolutions land the top speed score.
    assert_eq!(metrics.resolution_speed, 100);
    assert_eq!(metrics.first_response_time, 100);

    let stats = scoring::agent_stats(&activity);
    assert_eq!(stats.tickets_assigned, 13);
    assert_eq!(stats.tickets_resolved, 12);
    assert_eq!(stats.response_rate, "92%");
    assert_eq!(stats.average_resolution_time, "3.0 hours");
}

#[test]
fn activity_report_ranks_the_working_agent_first() {
    let month = busy_month();
    let idle = analysis::UserActivityInput {
        username: "lurker".to_string(),
        full_name: "Lurker".to_string(),
        tickets_created: 0,
        resolved: vec![],
        comments: vec![],
    };
    let busy = analysis::UserActivityInput {
        username: "ada".to_string(),
        full_name: "Ada".to_string(),
        tickets_created: 0,
        resolved: month
            .tickets
            .iter()
            .filter(|t| t.status.is_resolved())
            .cloned()
            .collect(),
        comments: month.threads.values().flatten().cloned().collect(),
    };

    let ranked = analysis::user_activity(vec![idle, busy], day(1, 0));
    assert_eq!(ranked[0].username, "ada");
    assert_eq!(ranked[0].tickets_resolved, 12);
    assert_eq!(ranked[0].comments_added, 12);
    assert_eq!(ranked[1].last_active, day(1, 0));
}
