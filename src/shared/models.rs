use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::shared::schema::{roles, ticket_comments, tickets, users};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Reopened,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
            TicketStatus::Reopened => "REOPENED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// RESOLVED and CLOSED both count as a completed ticket in reporting.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] = [
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "LOW",
            TicketPriority::Medium => "MEDIUM",
            TicketPriority::High => "HIGH",
            TicketPriority::Critical => "CRITICAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "TEXT",
            ContentKind::Image => "IMAGE",
            ContentKind::Audio => "AUDIO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [ContentKind::Text, ContentKind::Image, ContentKind::Audio]
            .into_iter()
            .find(|k| k.as_str() == raw)
    }
}

macro_rules! text_enum_sql {
    ($ty:ty, $label:literal) => {
        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = std::str::from_utf8(value.as_bytes())?;
                Self::parse(raw).ok_or_else(|| format!("unrecognized {}: {raw}", $label).into())
            }
        }
    };
}

text_enum_sql!(TicketStatus, "ticket status");
text_enum_sql!(TicketPriority, "ticket priority");
text_enum_sql!(ContentKind, "content kind");

/// Ticket payload as a tagged union. The row keeps three nullable columns for
/// the three kinds, but every write path goes through this type, so a row can
/// never carry an image path together with audio content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketContent {
    Text(String),
    Image(String),
    Audio(String),
}

impl TicketContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            TicketContent::Text(_) => ContentKind::Text,
            TicketContent::Image(_) => ContentKind::Image,
            TicketContent::Audio(_) => ContentKind::Audio,
        }
    }

    /// Split into the (content_type, text_content, image_path, audio_path) columns.
    pub fn into_columns(self) -> (ContentKind, Option<String>, Option<String>, Option<String>) {
        match self {
            TicketContent::Text(text) => (ContentKind::Text, Some(text), None, None),
            TicketContent::Image(path) => (ContentKind::Image, None, Some(path), None),
            TicketContent::Audio(path) => (ContentKind::Audio, None, None, Some(path)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
#[diesel(treat_none_as_null = true)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub content_type: ContentKind,
    pub text_content: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn content(&self) -> TicketContent {
        match self.content_type {
            ContentKind::Text => TicketContent::Text(self.text_content.clone().unwrap_or_default()),
            ContentKind::Image => TicketContent::Image(self.image_path.clone().unwrap_or_default()),
            ContentKind::Audio => TicketContent::Audio(self.audio_path.clone().unwrap_or_default()),
        }
    }

    pub fn set_content(&mut self, content: TicketContent) {
        let (kind, text, image, audio) = content.into_columns();
        self.content_type = kind;
        self.text_content = text;
        self.image_path = image;
        self.audio_path = audio;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_names() {
        for status in TicketStatus::ALL {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("PENDING"), None);
    }

    #[test]
    fn content_union_keeps_columns_consistent() {
        let (kind, text, image, audio) = TicketContent::Image("image/a.png".into()).into_columns();
        assert_eq!(kind, ContentKind::Image);
        assert!(text.is_none());
        assert_eq!(image.as_deref(), Some("image/a.png"));
        assert!(audio.is_none());
    }
}
