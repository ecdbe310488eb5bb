//! Row types mirroring the schema in `migrations/0001_init.sql`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PollRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_name: String,
    pub method: String,
    pub status: String,
    pub share_slug: Option<String>,
    pub closes_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub final_snapshot_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PollRow {
    pub fn is_draft(&self) -> bool {
        self.status == "draft"
    }
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
    pub fn is_closed(&self) -> bool {
        self.status == "closed"
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OptionRow {
    pub id: String,
    pub poll_id: String,
    pub label: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct UsernameClaimRow {
    pub poll_id: String,
    pub username: String,
    pub voter_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BallotRow {
    pub id: String,
    pub poll_id: String,
    pub voter_token: String,
    pub submitted_at: DateTime<Utc>,
    pub ip_hash: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScoreRow {
    pub ballot_id: String,
    pub option_id: String,
    pub value01: f64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ResultSnapshotRow {
    pub id: String,
    pub poll_id: String,
    pub method: String,
    pub computed_at: DateTime<Utc>,
    pub rankings: serde_json::Value,
    pub inputs_hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DeviceRow {
    pub id: String,
    pub device_uuid: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DevicePollRow {
    pub device_id: String,
    pub poll_id: String,
    pub role: String,
    pub username: Option<String>,
    pub linked_at: DateTime<Utc>,
}
