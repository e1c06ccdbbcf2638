//! Pure aggregation over ticket/comment snapshots. Everything here is a
//! synchronous computation on already-loaded rows so it can be exercised
//! without a database.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::shared::models::{Comment, Ticket, TicketPriority, TicketStatus};

use super::{
    PriorityAnalysis, ResponseTimeAnalysis, SlaMetrics, StatusDistribution, TicketTrends,
    Timeline, UserActivity,
};

/// First-response SLA threshold.
pub const RESPONSE_SLA_HOURS: f64 = 4.0;
/// Resolution SLA threshold.
pub const RESOLUTION_SLA_HOURS: f64 = 24.0;

pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_minutes() as f64 / 60.0
}

/// Bucket start points for `[start, end]`: daily steps for spans up to two
/// weeks, 5-day steps up to 60 days, 10-day steps beyond. The final bucket
/// may be shorter than the step.
pub fn date_points(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let span_days = (end - start).num_days();
    let step_days = if span_days <= 14 {
        1
    } else if span_days <= 60 {
        5
    } else {
        10
    };

    let mut points = Vec::new();
    let mut current = start;
    while current <= end {
        points.push(current);
        current += Duration::days(step_days);
    }
    points
}

/// Index of the bucket `[points[i], points[i+1])` containing `at`. A stamp on
/// a boundary belongs to the bucket starting there; a stamp on the last point
/// belongs to the last bucket. Outside `[first, last]` there is no bucket.
pub fn date_index(points: &[DateTime<Utc>], at: DateTime<Utc>) -> Option<usize> {
    let first = *points.first()?;
    let last = *points.last()?;
    if at < first || at > last {
        return None;
    }
    for i in 0..points.len() - 1 {
        if at >= points[i] && at < points[i + 1] {
            return Some(i);
        }
    }
    Some(points.len() - 1)
}

pub fn bucket_labels(points: &[DateTime<Utc>]) -> Vec<String> {
    points.iter().map(|p| p.format("%b %-d").to_string()).collect()
}

/// Created/resolved counts per bucket over `[start, end]`. Created counts
/// bucket by `created_at`; RESOLVED/CLOSED tickets also bucket by
/// `updated_at` into the resolved series.
pub fn ticket_trends(
    tickets: &[Ticket],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> TicketTrends {
    let points = date_points(start, end);
    let mut created = vec![0i64; points.len()];
    let mut resolved = vec![0i64; points.len()];
    let mut dropped = 0usize;

    for ticket in tickets {
        match date_index(&points, ticket.created_at) {
            Some(i) => created[i] += 1,
            None => dropped += 1,
        }
        if ticket.status.is_resolved() {
            if let Some(i) = date_index(&points, ticket.updated_at) {
                resolved[i] += 1;
            }
        }
    }

    if dropped > 0 {
        debug!("{dropped} tickets fell outside the trend buckets");
    }

    TicketTrends {
        labels: bucket_labels(&points),
        created,
        resolved,
    }
}

/// Counts per status over the whole ticket set; every status key is present.
pub fn status_distribution(tickets: &[Ticket]) -> StatusDistribution {
    let mut status_counts: BTreeMap<String, i64> = TicketStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();

    for ticket in tickets {
        *status_counts
            .entry(ticket.status.as_str().to_string())
            .or_insert(0) += 1;
    }

    StatusDistribution { status_counts }
}

/// New vs. resolved counts per priority over a trailing 30-day window; every
/// priority key is present.
pub fn priority_analysis(tickets: &[Ticket], now: DateTime<Utc>) -> PriorityAnalysis {
    let window_start = now - Duration::days(30);

    let zeroed: BTreeMap<String, i64> = TicketPriority::ALL
        .iter()
        .map(|p| (p.as_str().to_string(), 0))
        .collect();
    let mut new_tickets = zeroed.clone();
    let mut resolved = zeroed;

    for ticket in tickets {
        let key = ticket.priority.as_str();
        if ticket.created_at > window_start {
            *new_tickets.entry(key.to_string()).or_insert(0) += 1;
        }
        if ticket.status.is_resolved() && ticket.updated_at > window_start {
            *resolved.entry(key.to_string()).or_insert(0) += 1;
        }
    }

    PriorityAnalysis { new_tickets, resolved }
}

/// Per-user raw rows for one activity window.
pub struct UserActivityInput {
    pub username: String,
    pub full_name: String,
    pub tickets_created: i64,
    /// Tickets assigned to the user and resolved within the window.
    pub resolved: Vec<Ticket>,
    /// Comments the user authored within the window.
    pub comments: Vec<Comment>,
}

/// Activity summaries sorted by `tickets_resolved + comments_added`,
/// descending. The sort is stable, so ties keep their input order.
pub fn user_activity(
    inputs: Vec<UserActivityInput>,
    window_start: DateTime<Utc>,
) -> Vec<UserActivity> {
    let mut summaries: Vec<UserActivity> = inputs
        .into_iter()
        .map(|input| {
            let mut last_active = window_start;
            if let Some(latest) = input.comments.iter().map(|c| c.created_at).max() {
                last_active = last_active.max(latest);
            }
            if let Some(latest) = input.resolved.iter().map(|t| t.updated_at).max() {
                last_active = last_active.max(latest);
            }

            UserActivity {
                username: input.username,
                full_name: input.full_name,
                tickets_created: input.tickets_created,
                tickets_resolved: input.resolved.len() as i64,
                comments_added: input.comments.len() as i64,
                last_active,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        (b.tickets_resolved + b.comments_added).cmp(&(a.tickets_resolved + a.comments_added))
    });
    summaries
}

/// Per-bucket first-response/resolution averages plus global SLA metrics for
/// tickets created in `[start, end]`. `comments_by_ticket` must hold each
/// ticket's comments in ascending creation order.
pub fn response_time_analysis(
    tickets: &[Ticket],
    comments_by_ticket: &HashMap<Uuid, Vec<Comment>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ResponseTimeAnalysis {
    let points = date_points(start, end);
    let mut first_response_sums = vec![0f64; points.len()];
    let mut resolution_sums = vec![0f64; points.len()];
    let mut first_response_counts = vec![0usize; points.len()];
    let mut resolution_counts = vec![0usize; points.len()];

    let total_tickets = tickets.len() as i64;
    let mut response_sla_met = 0i64;
    let mut resolution_sla_met = 0i64;
    let mut total_first_response_hours = 0f64;
    let mut total_resolution_hours = 0f64;
    let mut tickets_with_first_response = 0i64;
    let mut tickets_resolved = 0i64;

    for ticket in tickets {
        let Some(index) = date_index(&points, ticket.created_at) else {
            continue;
        };

        let first_comment = comments_by_ticket
            .get(&ticket.id)
            .and_then(|comments| comments.first());
        if let Some(comment) = first_comment {
            let hours = hours_between(ticket.created_at, comment.created_at);
            first_response_sums[index] += hours;
            first_response_counts[index] += 1;
            total_first_response_hours += hours;
            tickets_with_first_response += 1;
            if hours <= RESPONSE_SLA_HOURS {
                response_sla_met += 1;
            }
        }

        if ticket.status.is_resolved() {
            let hours = hours_between(ticket.created_at, ticket.updated_at);
            resolution_sums[index] += hours;
            resolution_counts[index] += 1;
            total_resolution_hours += hours;
            tickets_resolved += 1;
            if hours <= RESOLUTION_SLA_HOURS {
                resolution_sla_met += 1;
            }
        }
    }

    // Empty buckets stay at 0.0 rather than dividing by zero.
    let first_response_time: Vec<f64> = first_response_sums
        .iter()
        .zip(&first_response_counts)
        .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect();
    let resolution_time: Vec<f64> = resolution_sums
        .iter()
        .zip(&resolution_counts)
        .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect();

    let average_first_response = if tickets_with_first_response > 0 {
        format_duration(total_first_response_hours / tickets_with_first_response as f64)
    } else {
        "0 hours".to_string()
    };
    let average_resolution_time = if tickets_resolved > 0 {
        format_duration(total_resolution_hours / tickets_resolved as f64)
    } else {
        "0 hours".to_string()
    };

    ResponseTimeAnalysis {
        timeline: Timeline {
            labels: bucket_labels(&points),
            first_response_time,
            resolution_time,
        },
        metrics: SlaMetrics {
            average_first_response,
            average_resolution_time,
            response_sla: percentage(response_sla_met, total_tickets),
            resolution_sla: percentage(resolution_sla_met, total_tickets),
        },
    }
}

/// `met * 100 / total` with integer truncation; `0%` for an empty set.
pub fn percentage(met: i64, total: i64) -> String {
    if total > 0 {
        format!("{}%", met * 100 / total)
    } else {
        "0%".to_string()
    }
}

/// Render an hour count the way the dashboards expect: minutes under an
/// hour, fractional hours under a day, fractional days beyond.
pub fn format_duration(hours: f64) -> String {
    if hours < 1.0 {
        format!("{:.0} minutes", hours * 60.0)
    } else if hours < 24.0 {
        format!("{hours:.1} hours")
    } else {
        format!("{:.1} days", hours / 24.0)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{comment, ticket};
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn bucket_width_follows_span() {
        let start = at(1, 0);
        assert_eq!(date_points(start, start + Duration::days(14)).len(), 15);
        // 15-day span switches to 5-day buckets.
        let points = date_points(start, start + Duration::days(15));
        assert_eq!(points[1] - points[0], Duration::days(5));
        // Beyond 60 days, 10-day buckets.
        let points = date_points(start, start + Duration::days(61));
        assert_eq!(points[1] - points[0], Duration::days(10));
    }

    #[test]
    fn boundary_stamp_belongs_to_its_bucket() {
        let points = date_points(at(1, 0), at(10, 0));
        // Exactly on the second boundary: bucket 1, not bucket 0.
        assert_eq!(date_index(&points, at(2, 0)), Some(1));
        // Exactly on the last point: last bucket.
        assert_eq!(date_index(&points, at(10, 0)), Some(points.len() - 1));
        // Strictly after the last point: dropped.
        assert_eq!(date_index(&points, at(10, 1)), None);
        // Before the first point: dropped.
        assert_eq!(date_index(&points, at(1, 0) - Duration::minutes(1)), None);
    }

    #[test]
    fn trend_scenario_ten_days() {
        let start = at(1, 0);
        let end = at(10, 0);
        let tickets = vec![
            ticket(TicketStatus::Open, at(2, 3), at(2, 3)),
            ticket(TicketStatus::Open, at(2, 9), at(2, 9)),
            ticket(TicketStatus::InProgress, at(2, 15), at(3, 0)),
            ticket(TicketStatus::Resolved, at(2, 1), at(5, 8)),
            ticket(TicketStatus::Closed, at(3, 1), at(5, 20)),
        ];

        let trends = ticket_trends(&tickets, start, end);
        assert_eq!(trends.labels.len(), 10);
        assert_eq!(trends.created[1], 4); // four tickets created on day 2
        assert_eq!(trends.created[2], 1);
        assert_eq!(trends.resolved[4], 2); // two resolved on day 5
        assert_eq!(trends.resolved.iter().sum::<i64>(), 2);
    }

    #[test]
    fn out_of_range_tickets_are_dropped_not_errors() {
        let trends = ticket_trends(
            &[ticket(TicketStatus::Open, at(20, 0), at(20, 0))],
            at(1, 0),
            at(10, 0),
        );
        assert_eq!(trends.created.iter().sum::<i64>(), 0);
    }

    #[test]
    fn status_distribution_always_has_all_keys() {
        let distribution = status_distribution(&[]);
        assert_eq!(distribution.status_counts.len(), 5);
        assert!(distribution.status_counts.values().all(|&c| c == 0));

        let distribution = status_distribution(&[
            ticket(TicketStatus::Open, at(1, 0), at(1, 0)),
            ticket(TicketStatus::Open, at(2, 0), at(2, 0)),
            ticket(TicketStatus::Reopened, at(3, 0), at(3, 0)),
        ]);
        assert_eq!(distribution.status_counts["OPEN"], 2);
        assert_eq!(distribution.status_counts["REOPENED"], 1);
        assert_eq!(distribution.status_counts["CLOSED"], 0);
    }

    #[test]
    fn priority_analysis_has_all_keys_and_windows() {
        let now = at(28, 0);
        let recent = ticket(TicketStatus::Resolved, at(20, 0), at(21, 0));
        let mut old = ticket(TicketStatus::Open, at(20, 0), at(20, 0));
        old.created_at = now - Duration::days(45);
        old.updated_at = old.created_at;

        let analysis = priority_analysis(&[recent, old], now);
        assert_eq!(analysis.new_tickets.len(), 4);
        assert_eq!(analysis.new_tickets["MEDIUM"], 1);
        assert_eq!(analysis.resolved["MEDIUM"], 1);
        assert_eq!(analysis.new_tickets["CRITICAL"], 0);
    }

    #[test]
    fn user_activity_sorts_by_resolved_plus_comments() {
        let window_start = at(1, 0);
        let author = Uuid::new_v4();
        let a = UserActivityInput {
            username: "a".to_string(),
            full_name: "User A".to_string(),
            tickets_created: 0,
            resolved: vec![
                ticket(TicketStatus::Resolved, at(2, 0), at(3, 0)),
                ticket(TicketStatus::Closed, at(2, 0), at(4, 0)),
            ],
            comments: vec![comment(Uuid::new_v4(), author, at(5, 0))],
        };
        let b = UserActivityInput {
            username: "b".to_string(),
            full_name: "User B".to_string(),
            tickets_created: 0,
            resolved: vec![ticket(TicketStatus::Resolved, at(2, 0), at(6, 0))],
            comments: vec![comment(Uuid::new_v4(), author, at(2, 0))],
        };

        let summary = user_activity(vec![b, a], window_start);
        assert_eq!(summary[0].username, "a");
        assert_eq!(summary[0].tickets_resolved + summary[0].comments_added, 3);
        assert_eq!(summary[1].username, "b");
        // Last activity picks the later of comments and resolutions.
        assert_eq!(summary[0].last_active, at(5, 0));
        assert_eq!(summary[1].last_active, at(6, 0));
    }

    #[test]
    fn idle_user_last_active_defaults_to_window_start() {
        let summary = user_activity(
            vec![UserActivityInput {
                username: "idle".to_string(),
                full_name: "Idle".to_string(),
                tickets_created: 0,
                resolved: vec![],
                comments: vec![],
            }],
            at(1, 0),
        );
        assert_eq!(summary[0].last_active, at(1, 0));
    }

    #[test]
    fn sla_percentages_with_no_tickets() {
        let analysis = response_time_analysis(&[], &HashMap::new(), at(1, 0), at(10, 0));
        assert_eq!(analysis.metrics.response_sla, "0%");
        assert_eq!(analysis.metrics.resolution_sla, "0%");
        assert_eq!(analysis.metrics.average_first_response, "0 hours");
        assert!(analysis.timeline.first_response_time.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sla_metrics_counted_against_full_range_set() {
        let agent = Uuid::new_v4();
        // Resolved in 8h: meets resolution SLA, response after 6h misses response SLA.
        let slow = ticket(TicketStatus::Resolved, at(2, 0), at(2, 8));
        // Response in 1h: meets response SLA; never resolved.
        let fast = ticket(TicketStatus::Open, at(3, 0), at(3, 0));

        let mut comments = HashMap::new();
        comments.insert(slow.id, vec![comment(slow.id, agent, at(2, 6))]);
        comments.insert(fast.id, vec![comment(fast.id, agent, at(3, 1))]);

        let analysis =
            response_time_analysis(&[slow, fast], &comments, at(1, 0), at(10, 0));
        assert_eq!(analysis.metrics.response_sla, "50%");
        assert_eq!(analysis.metrics.resolution_sla, "50%");
        assert_eq!(analysis.timeline.first_response_time[1], 6.0);
        assert_eq!(analysis.timeline.first_response_time[2], 1.0);
        assert_eq!(analysis.timeline.resolution_time[1], 8.0);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0.5), "30 minutes");
        assert_eq!(format_duration(2.0), "2.0 hours");
        assert_eq!(format_duration(48.0), "2.0 days");
    }

    #[test]
    fn percentage_truncates() {
        assert_eq!(percentage(1, 3), "33%");
        assert_eq!(percentage(2, 3), "66%");
        assert_eq!(percentage(0, 0), "0%");
    }
}
