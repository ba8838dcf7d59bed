use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TrackerError;

/// Lifecycle stage of a tracked application. `Wishlist` is where every
/// application starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Wishlist,
    Applied,
    PhoneScreen,
    Interview,
    Offer,
    Rejected,
    Accepted,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Wishlist,
        Status::Applied,
        Status::PhoneScreen,
        Status::Interview,
        Status::Offer,
        Status::Rejected,
        Status::Accepted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Wishlist => "wishlist",
            Status::Applied => "applied",
            Status::PhoneScreen => "phone_screen",
            Status::Interview => "interview",
            Status::Offer => "offer",
            Status::Rejected => "rejected",
            Status::Accepted => "accepted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept "Phone Screen", "phone-screen" and "phone_screen" alike
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Status::ALL
            .iter()
            .find(|status| status.as_str() == normalized)
            .copied()
            .ok_or_else(|| {
                let allowed: Vec<&str> = Status::ALL.iter().map(Status::as_str).collect();
                TrackerError::Validation(format!(
                    "unknown status '{}' (expected one of: {})",
                    s,
                    allowed.join(", ")
                ))
            })
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: TrackerError| FromSqlError::Other(e.to_string().into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedApplication {
    pub id: i64,
    pub user_id: i64,
    pub company: String,
    pub position: String,
    pub status: Status,
    pub job_url: Option<String>,
    pub notes: Option<String>,
    pub applied_date: Option<DateTime<Utc>>,
    pub salary_range: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating an application. `status` defaults to
/// `Status::Wishlist` when left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApplication {
    pub company: String,
    pub position: String,
    pub status: Option<Status>,
    pub job_url: Option<String>,
    pub notes: Option<String>,
    pub applied_date: Option<DateTime<Utc>>,
    pub salary_range: Option<String>,
}

/// Partial update: `None` means "leave as is".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    pub company: Option<String>,
    pub position: Option<String>,
    pub status: Option<Status>,
    pub job_url: Option<String>,
    pub notes: Option<String>,
    pub applied_date: Option<DateTime<Utc>>,
    pub salary_range: Option<String>,
}

impl ApplicationUpdate {
    pub fn is_empty(&self) -> bool {
        self.company.is_none()
            && self.position.is_none()
            && self.status.is_none()
            && self.job_url.is_none()
            && self.notes.is_none()
            && self.applied_date.is_none()
            && self.salary_range.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPosting {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub posted_date: Option<String>,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

/// One unparsed unit as handed over by a `JobSource`: a markup fragment
/// (usually a single job card) plus the context needed to interpret it.
#[derive(Debug, Clone)]
pub struct RawPosting {
    pub source: String,
    pub base_url: String,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPosting {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub posted_date: Option<String>,
    pub source: String,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub stored_count: usize,
    pub duplicate_count: usize,
    pub skipped_count: usize,
    pub stored_items: Vec<ScrapedPosting>,
}

#[derive(Debug, Serialize)]
pub struct PostingPage {
    pub count: usize,
    pub items: Vec<ScrapedPosting>,
}
