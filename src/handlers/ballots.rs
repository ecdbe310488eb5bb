//! Ballot service handlers (C4): username claims and score submission.

use std::collections::HashMap;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::credentials;
use crate::db::ballots::SubmitOutcome;
use crate::error::{AppError, AppResult};
use crate::extract::{DeviceUuidHeader, VoterTokenHeader};
use crate::state::AppState;

fn require_poll_open(poll: &crate::db::models::PollRow) -> AppResult<()> {
    if !poll.is_open() {
        return Err(AppError::Conflict("poll is not open".into()));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ClaimUsernameRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct ClaimUsernameResponse {
    pub voter_token: String,
}

pub async fn claim_username(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    DeviceUuidHeader(device_uuid): DeviceUuidHeader,
    Json(body): Json<ClaimUsernameRequest>,
) -> AppResult<Json<ClaimUsernameResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    require_poll_open(&poll)?;

    let username = body.username.trim();
    if username.chars().count() < 2 || username.chars().count() > 50 {
        return Err(AppError::Validation(
            "username must be 2-50 characters".into(),
        ));
    }

    let token = credentials::voter_token();
    let claim = state
        .db
        .insert_claim(&poll.id, username, &token)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict("Username already taken".into())
            } else {
                AppError::from(err)
            }
        })?;

    if let Some(uuid) = device_uuid {
        let device_id = credentials::random_id(16);
        let device_id = state.db.ensure_device(&device_id, &uuid).await?;
        state
            .db
            .link_device_to_poll(&device_id, &poll.id, "voter", Some(&claim.username))
            .await?;
    }

    Ok(Json(ClaimUsernameResponse {
        voter_token: claim.voter_token,
    }))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[derive(Deserialize)]
pub struct SubmitBallotRequest {
    pub scores: HashMap<String, f64>,
}

#[derive(Serialize)]
pub struct SubmitBallotResponse {
    pub ballot_id: String,
    pub message: &'static str,
}

pub async fn submit_ballot(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    VoterTokenHeader(voter_token): VoterTokenHeader,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<SubmitBallotRequest>,
) -> AppResult<Json<SubmitBallotResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    require_poll_open(&poll)?;

    let claim = state
        .db
        .get_claim_by_token(&poll.id, &voter_token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    for value in body.scores.values() {
        if !(0.0..=1.0).contains(value) {
            return Err(AppError::Validation(
                "every score must be between 0 and 1".into(),
            ));
        }
    }

    let options = state.db.list_options(&poll.id).await?;
    let valid_ids: std::collections::HashSet<&str> =
        options.iter().map(|o| o.id.as_str()).collect();
    for option_id in body.scores.keys() {
        if !valid_ids.contains(option_id.as_str()) {
            return Err(AppError::Validation(format!(
                "unknown option id: {option_id}"
            )));
        }
    }

    let ip_hash = Some(credentials::ip_hash(
        &addr.ip().to_string(),
        &state.config.ip_salt,
    ));
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let new_ballot_id = credentials::random_id(16);
    let (ballot_id, outcome) = state
        .db
        .submit_ballot(
            &new_ballot_id,
            &poll.id,
            &claim.voter_token,
            &body.scores,
            ip_hash.as_deref(),
            user_agent.as_deref(),
        )
        .await?;

    let message = match outcome {
        SubmitOutcome::Created => "ballot submitted",
        SubmitOutcome::Updated => "ballot updated",
    };

    Ok(Json(SubmitBallotResponse { ballot_id, message }))
}

#[derive(Serialize)]
pub struct MyBallotResponse {
    pub scores: HashMap<String, f64>,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub has_voted: bool,
}

pub async fn my_ballot(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    VoterTokenHeader(voter_token): VoterTokenHeader,
) -> AppResult<Json<MyBallotResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;

    let Some(ballot) = state.db.get_ballot(&poll.id, &voter_token).await? else {
        return Ok(Json(MyBallotResponse {
            scores: HashMap::new(),
            submitted_at: None,
            has_voted: false,
        }));
    };

    let scores = state.db.get_scores_for_ballot(&ballot.id).await?;
    Ok(Json(MyBallotResponse {
        scores,
        submitted_at: Some(ballot.submitted_at),
        has_voted: true,
    }))
}
