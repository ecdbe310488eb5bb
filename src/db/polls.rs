//! Poll lifecycle queries (C3): draft -> open -> closed, enforced with
//! conditional `UPDATE ... WHERE status = $expected` so a losing racer
//! always sees zero rows affected rather than corrupting state.

use chrono::{DateTime, Utc};

use crate::bmj::{self, BallotInput, OptionInput, Snapshot};

use super::models::{OptionRow, PollRow};
use super::Database;

pub struct CloseOutcome {
    pub closed_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

impl Database {
    pub async fn insert_poll(
        &self,
        id: &str,
        title: &str,
        description: &str,
        creator_name: &str,
    ) -> Result<PollRow, sqlx::Error> {
        sqlx::query_as::<_, PollRow>(
            r#"
            INSERT INTO poll (id, title, description, creator_name, method, status)
            VALUES ($1, $2, $3, $4, 'bmj', 'draft')
            RETURNING id, title, description, creator_name, method, status,
                      share_slug, closes_at, closed_at, final_snapshot_id, created_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(creator_name)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_poll_by_id(&self, poll_id: &str) -> Result<Option<PollRow>, sqlx::Error> {
        sqlx::query_as::<_, PollRow>(
            r#"SELECT id, title, description, creator_name, method, status,
                      share_slug, closes_at, closed_at, final_snapshot_id, created_at
               FROM poll WHERE id = $1"#,
        )
        .bind(poll_id)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn get_poll_by_slug(&self, slug: &str) -> Result<Option<PollRow>, sqlx::Error> {
        sqlx::query_as::<_, PollRow>(
            r#"SELECT id, title, description, creator_name, method, status,
                      share_slug, closes_at, closed_at, final_snapshot_id, created_at
               FROM poll WHERE share_slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn insert_option(
        &self,
        id: &str,
        poll_id: &str,
        label: &str,
    ) -> Result<OptionRow, sqlx::Error> {
        sqlx::query_as::<_, OptionRow>(
            r#"INSERT INTO poll_option (id, poll_id, label) VALUES ($1, $2, $3)
               RETURNING id, poll_id, label"#,
        )
        .bind(id)
        .bind(poll_id)
        .bind(label)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_options(&self, poll_id: &str) -> Result<Vec<OptionRow>, sqlx::Error> {
        sqlx::query_as::<_, OptionRow>(
            r#"SELECT id, poll_id, label FROM poll_option WHERE poll_id = $1 ORDER BY label ASC"#,
        )
        .bind(poll_id)
        .fetch_all(self.pool())
        .await
    }

    pub async fn count_options(&self, poll_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM poll_option WHERE poll_id = $1"#)
                .bind(poll_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    pub async fn count_ballots(&self, poll_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM ballot WHERE poll_id = $1"#)
                .bind(poll_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    /// Transitions draft -> open and assigns the deterministic share slug.
    /// Returns `true` iff this call performed the transition (status was
    /// still `draft`); `false` means a racing/duplicate publish lost.
    pub async fn publish_poll(&self, poll_id: &str, slug: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE poll SET status = 'open', share_slug = $2
               WHERE id = $1 AND status = 'draft'"#,
        )
        .bind(poll_id)
        .bind(slug)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Runs the whole close-poll contract in one transaction: lock the
    /// poll row, verify it is still open, compute the BMJ snapshot over
    /// the current ballots, insert the snapshot, and seal the poll.
    /// Returns `None` if the poll was not open (already closed, or a
    /// racing close won first).
    pub async fn close_poll(
        &self,
        poll_id: &str,
        snapshot_id: &str,
    ) -> Result<Option<CloseOutcome>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let locked: Option<(String,)> =
            sqlx::query_as(r#"SELECT status FROM poll WHERE id = $1 FOR UPDATE"#)
                .bind(poll_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((status,)) = locked else {
            return Ok(None);
        };
        if status != "open" {
            return Ok(None);
        }

        let options: Vec<OptionRow> = sqlx::query_as(
            r#"SELECT id, poll_id, label FROM poll_option WHERE poll_id = $1 ORDER BY label ASC"#,
        )
        .bind(poll_id)
        .fetch_all(&mut *tx)
        .await?;

        let ballot_rows: Vec<(String,)> =
            sqlx::query_as(r#"SELECT id FROM ballot WHERE poll_id = $1"#)
                .bind(poll_id)
                .fetch_all(&mut *tx)
                .await?;

        let mut ballots = Vec::with_capacity(ballot_rows.len());
        for (ballot_id,) in &ballot_rows {
            let score_rows: Vec<(String, f64)> =
                sqlx::query_as(r#"SELECT option_id, value01 FROM score WHERE ballot_id = $1"#)
                    .bind(ballot_id)
                    .fetch_all(&mut *tx)
                    .await?;
            ballots.push(BallotInput {
                ballot_id: ballot_id.clone(),
                scores: score_rows.into_iter().collect(),
            });
        }

        let option_inputs: Vec<OptionInput> = options
            .iter()
            .map(|o| OptionInput {
                id: o.id.clone(),
                label: o.label.clone(),
            })
            .collect();

        let snapshot = bmj::compute_snapshot(&option_inputs, &ballots);
        let computed_at = Utc::now();
        let rankings_json = serde_json::to_value(&snapshot.rankings)
            .expect("OptionStats is always representable as JSON");

        sqlx::query(
            r#"INSERT INTO result_snapshot (id, poll_id, method, computed_at, rankings, inputs_hash)
               VALUES ($1, $2, 'bmj', $3, $4, $5)"#,
        )
        .bind(snapshot_id)
        .bind(poll_id)
        .bind(computed_at)
        .bind(&rankings_json)
        .bind(&snapshot.inputs_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE poll SET status = 'closed', closed_at = $2, final_snapshot_id = $3
               WHERE id = $1 AND status = 'open'"#,
        )
        .bind(poll_id)
        .bind(computed_at)
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(CloseOutcome {
            closed_at: computed_at,
            snapshot,
        }))
    }

    pub async fn get_snapshot_for_poll(
        &self,
        poll_id: &str,
    ) -> Result<Option<Snapshot>, sqlx::Error> {
        let row: Option<(serde_json::Value, String)> = sqlx::query_as(
            r#"SELECT rankings, inputs_hash FROM result_snapshot WHERE poll_id = $1"#,
        )
        .bind(poll_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(rankings, inputs_hash)| Snapshot {
            rankings: serde_json::from_value(rankings)
                .expect("rankings were written by this crate as valid OptionStats JSON"),
            inputs_hash,
        }))
    }
}
