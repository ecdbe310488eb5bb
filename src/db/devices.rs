//! Device association queries (C6): advisory UX-recovery layer, never
//! authoritative for ownership.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::DeviceRow;
use super::Database;

pub struct RegisterOutcome {
    pub device: DeviceRow,
    pub is_new: bool,
}

#[derive(Debug, Serialize)]
pub struct MyPollSummary {
    pub poll_id: String,
    pub title: String,
    pub status: String,
    pub role: String,
    pub username: Option<String>,
    pub ballot_count: i64,
    pub linked_at: DateTime<Utc>,
}

impl Database {
    pub async fn get_device_by_uuid(
        &self,
        device_uuid: &str,
    ) -> Result<Option<DeviceRow>, sqlx::Error> {
        sqlx::query_as::<_, DeviceRow>(
            r#"SELECT id, device_uuid, platform, created_at, last_seen_at
               FROM device WHERE device_uuid = $1"#,
        )
        .bind(device_uuid)
        .fetch_optional(self.pool())
        .await
    }

    /// Insert-or-update by `device_uuid`: bumps `platform`/`last_seen_at`
    /// on every call.
    pub async fn register_device(
        &self,
        new_id: &str,
        device_uuid: &str,
        platform: &str,
    ) -> Result<RegisterOutcome, sqlx::Error> {
        let now = Utc::now();
        let row: (String, bool) = sqlx::query_as(
            r#"
            INSERT INTO device (id, device_uuid, platform, created_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (device_uuid) DO UPDATE
                SET platform = EXCLUDED.platform, last_seen_at = EXCLUDED.last_seen_at
            RETURNING id, (xmax = 0) AS is_new
            "#,
        )
        .bind(new_id)
        .bind(device_uuid)
        .bind(platform)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        let (id, is_new) = row;
        let device = self
            .get_device_by_uuid(device_uuid)
            .await?
            .unwrap_or_else(|| panic!("device {id} just written but missing on reread"));

        Ok(RegisterOutcome { device, is_new })
    }

    /// Ensures a device row exists for `device_uuid` (used by the
    /// implicit-linking side effects of poll creation / username claim),
    /// returning its internal id.
    pub async fn ensure_device(&self, new_id: &str, device_uuid: &str) -> Result<String, sqlx::Error> {
        if let Some(existing) = self.get_device_by_uuid(device_uuid).await? {
            Ok(existing.id)
        } else {
            let outcome = self.register_device(new_id, device_uuid, "web").await?;
            Ok(outcome.device.id)
        }
    }

    /// Idempotent via the `(device_id, poll_id, role)` unique constraint.
    pub async fn link_device_to_poll(
        &self,
        device_id: &str,
        poll_id: &str,
        role: &str,
        username: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO device_poll (device_id, poll_id, role, username)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (device_id, poll_id, role) DO NOTHING
            "#,
        )
        .bind(device_id)
        .bind(poll_id)
        .bind(role)
        .bind(username)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_my_polls(
        &self,
        device_uuid: &str,
    ) -> Result<Vec<MyPollSummary>, sqlx::Error> {
        sqlx::query_as::<_, MyPollSummaryRow>(
            r#"
            SELECT p.id AS poll_id, p.title, p.status, dp.role, dp.username,
                   COALESCE(b.ballot_count, 0) AS ballot_count, dp.linked_at
            FROM device_poll dp
            JOIN device d ON d.id = dp.device_id
            JOIN poll p ON p.id = dp.poll_id
            LEFT JOIN (
                SELECT poll_id, COUNT(*) AS ballot_count FROM ballot GROUP BY poll_id
            ) b ON b.poll_id = p.id
            WHERE d.device_uuid = $1
            ORDER BY dp.linked_at DESC
            "#,
        )
        .bind(device_uuid)
        .fetch_all(self.pool())
        .await
        .map(|rows| rows.into_iter().map(MyPollSummaryRow::into_summary).collect())
    }
}

#[derive(sqlx::FromRow)]
struct MyPollSummaryRow {
    poll_id: String,
    title: String,
    status: String,
    role: String,
    username: Option<String>,
    ballot_count: i64,
    linked_at: DateTime<Utc>,
}

impl MyPollSummaryRow {
    fn into_summary(self) -> MyPollSummary {
        MyPollSummary {
            poll_id: self.poll_id,
            title: self.title,
            status: self.status,
            role: self.role,
            username: self.username,
            ballot_count: self.ballot_count,
            linked_at: self.linked_at,
        }
    }
}
