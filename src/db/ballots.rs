//! Ballot service queries (C4): username claims and the ballot UPSERT.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::models::{BallotRow, UsernameClaimRow};
use super::Database;

/// Whether a ballot submission created a new ballot or edited an existing one.
pub enum SubmitOutcome {
    Created,
    Updated,
}

impl Database {
    pub async fn get_claim_by_username(
        &self,
        poll_id: &str,
        username: &str,
    ) -> Result<Option<UsernameClaimRow>, sqlx::Error> {
        sqlx::query_as::<_, UsernameClaimRow>(
            r#"SELECT poll_id, username, voter_token, created_at
               FROM username_claim WHERE poll_id = $1 AND username = $2"#,
        )
        .bind(poll_id)
        .bind(username)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn get_claim_by_token(
        &self,
        poll_id: &str,
        voter_token: &str,
    ) -> Result<Option<UsernameClaimRow>, sqlx::Error> {
        sqlx::query_as::<_, UsernameClaimRow>(
            r#"SELECT poll_id, username, voter_token, created_at
               FROM username_claim WHERE poll_id = $1 AND voter_token = $2"#,
        )
        .bind(poll_id)
        .bind(voter_token)
        .fetch_optional(self.pool())
        .await
    }

    /// Inserts a new username claim. Returns `Err(sqlx::Error::Database(..))`
    /// with a unique-violation code when the username is already taken --
    /// the caller maps that to a 409, per spec §4.3.
    pub async fn insert_claim(
        &self,
        poll_id: &str,
        username: &str,
        voter_token: &str,
    ) -> Result<UsernameClaimRow, sqlx::Error> {
        sqlx::query_as::<_, UsernameClaimRow>(
            r#"INSERT INTO username_claim (poll_id, username, voter_token)
               VALUES ($1, $2, $3)
               RETURNING poll_id, username, voter_token, created_at"#,
        )
        .bind(poll_id)
        .bind(username)
        .bind(voter_token)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_ballot(
        &self,
        poll_id: &str,
        voter_token: &str,
    ) -> Result<Option<BallotRow>, sqlx::Error> {
        sqlx::query_as::<_, BallotRow>(
            r#"SELECT id, poll_id, voter_token, submitted_at, ip_hash, user_agent
               FROM ballot WHERE poll_id = $1 AND voter_token = $2"#,
        )
        .bind(poll_id)
        .bind(voter_token)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn get_scores_for_ballot(
        &self,
        ballot_id: &str,
    ) -> Result<HashMap<String, f64>, sqlx::Error> {
        let rows: Vec<(String, f64)> =
            sqlx::query_as(r#"SELECT option_id, value01 FROM score WHERE ballot_id = $1"#)
                .bind(ballot_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Atomically UPSERTs a ballot and replaces its score set. A plain
    /// `SELECT ... FOR UPDATE` takes no lock when no row exists yet, so two
    /// concurrent first-time submits for the same voter would both fall
    /// through to an `INSERT` and race on the `(poll_id, voter_token)`
    /// unique constraint. `INSERT ... ON CONFLICT ... DO UPDATE` closes
    /// that window: the loser of the race updates the winner's row instead
    /// of erroring, the same atomic-upsert idiom used for devices in
    /// `devices.rs::register_device`.
    pub async fn submit_ballot(
        &self,
        new_ballot_id: &str,
        poll_id: &str,
        voter_token: &str,
        scores: &HashMap<String, f64>,
        ip_hash: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(String, SubmitOutcome), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        let now: DateTime<Utc> = Utc::now();

        let (ballot_id, is_new): (String, bool) = sqlx::query_as(
            r#"
            INSERT INTO ballot (id, poll_id, voter_token, submitted_at, ip_hash, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (poll_id, voter_token) DO UPDATE
                SET submitted_at = EXCLUDED.submitted_at,
                    ip_hash = EXCLUDED.ip_hash,
                    user_agent = EXCLUDED.user_agent
            RETURNING id, (xmax = 0) AS is_new
            "#,
        )
        .bind(new_ballot_id)
        .bind(poll_id)
        .bind(voter_token)
        .bind(now)
        .bind(ip_hash)
        .bind(user_agent)
        .fetch_one(&mut *tx)
        .await?;

        let outcome = if is_new {
            SubmitOutcome::Created
        } else {
            SubmitOutcome::Updated
        };

        sqlx::query(r#"DELETE FROM score WHERE ballot_id = $1"#)
            .bind(&ballot_id)
            .execute(&mut *tx)
            .await?;

        for (option_id, value01) in scores {
            sqlx::query(
                r#"INSERT INTO score (ballot_id, option_id, value01) VALUES ($1, $2, $3)"#,
            )
            .bind(&ballot_id)
            .bind(option_id)
            .bind(value01)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((ballot_id, outcome))
    }
}
