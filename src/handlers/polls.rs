//! Poll lifecycle handlers (C3).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::bmj::Snapshot;
use crate::credentials;
use crate::db::models::{OptionRow, PollRow};
use crate::error::{AppError, AppResult};
use crate::extract::{AdminKeyHeader, DeviceUuidHeader};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_name: String,
}

#[derive(Serialize)]
pub struct CreatePollResponse {
    pub poll_id: String,
    pub admin_key: String,
}

pub async fn create_poll(
    State(state): State<AppState>,
    DeviceUuidHeader(device_uuid): DeviceUuidHeader,
    Json(body): Json<CreatePollRequest>,
) -> AppResult<Json<CreatePollResponse>> {
    let title = body.title.trim();
    let creator_name = body.creator_name.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(AppError::Validation(
            "title must be 1-200 characters".into(),
        ));
    }
    if creator_name.is_empty() || creator_name.chars().count() > 100 {
        return Err(AppError::Validation(
            "creator_name must be 1-100 characters".into(),
        ));
    }
    if body.description.chars().count() > 1000 {
        return Err(AppError::Validation(
            "description must be at most 1000 characters".into(),
        ));
    }

    let poll_id = credentials::random_id(16);
    let poll = state
        .db
        .insert_poll(&poll_id, title, &body.description, creator_name)
        .await?;
    let admin_key = credentials::admin_key(&poll.id, &state.config.admin_salt);

    if let Some(uuid) = device_uuid {
        let device_id = credentials::random_id(16);
        let device_id = state.db.ensure_device(&device_id, &uuid).await?;
        state
            .db
            .link_device_to_poll(&device_id, &poll.id, "admin", None)
            .await?;
    }

    Ok(Json(CreatePollResponse {
        poll_id: poll.id,
        admin_key,
    }))
}

async fn require_admin(
    state: &AppState,
    poll_id: &str,
    admin_key: &str,
) -> AppResult<PollRow> {
    let poll = state
        .db
        .get_poll_by_id(poll_id)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    if !credentials::verify_admin_key(poll_id, &state.config.admin_salt, admin_key) {
        return Err(AppError::Unauthorized);
    }
    Ok(poll)
}

#[derive(Deserialize)]
pub struct AddOptionRequest {
    pub label: String,
}

#[derive(Serialize)]
pub struct AddOptionResponse {
    pub option_id: String,
}

pub async fn add_option(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    AdminKeyHeader(admin_key): AdminKeyHeader,
    Json(body): Json<AddOptionRequest>,
) -> AppResult<Json<AddOptionResponse>> {
    let poll = require_admin(&state, &poll_id, &admin_key).await?;

    let label = body.label.trim();
    if label.is_empty() || label.chars().count() > 200 {
        return Err(AppError::Validation(
            "label must be 1-200 characters".into(),
        ));
    }
    if !poll.is_draft() {
        return Err(AppError::Conflict(
            "options can only be added while the poll is in draft".into(),
        ));
    }

    let option_id = credentials::random_id(12);
    let option = state.db.insert_option(&option_id, &poll.id, label).await?;
    Ok(Json(AddOptionResponse {
        option_id: option.id,
    }))
}

#[derive(Serialize)]
pub struct PublishPollResponse {
    pub share_slug: String,
    pub share_url: String,
}

pub async fn publish_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    AdminKeyHeader(admin_key): AdminKeyHeader,
) -> AppResult<Json<PublishPollResponse>> {
    let poll = require_admin(&state, &poll_id, &admin_key).await?;
    if !poll.is_draft() {
        return Err(AppError::Conflict(
            "poll must be in draft to publish".into(),
        ));
    }

    let option_count = state.db.count_options(&poll.id).await?;
    if option_count < 2 {
        return Err(AppError::Validation(
            "a poll needs at least 2 options before publishing".into(),
        ));
    }

    let slug = credentials::share_slug(&poll.id, &state.config.slug_salt);
    let published = state.db.publish_poll(&poll.id, &slug).await?;
    if !published {
        return Err(AppError::Conflict("poll is no longer in draft".into()));
    }

    Ok(Json(PublishPollResponse {
        share_url: format!("/polls/{slug}"),
        share_slug: slug,
    }))
}

#[derive(Serialize)]
pub struct ClosePollResponse {
    pub closed_at: chrono::DateTime<chrono::Utc>,
    pub snapshot: Snapshot,
}

pub async fn close_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    AdminKeyHeader(admin_key): AdminKeyHeader,
) -> AppResult<Json<ClosePollResponse>> {
    let poll = require_admin(&state, &poll_id, &admin_key).await?;
    if !poll.is_open() {
        return Err(AppError::Conflict("poll is not open".into()));
    }

    let snapshot_id = credentials::random_id(16);
    let outcome = state
        .db
        .close_poll(&poll.id, &snapshot_id)
        .await?
        .ok_or_else(|| AppError::Conflict("poll is not open".into()))?;

    Ok(Json(ClosePollResponse {
        closed_at: outcome.closed_at,
        snapshot: outcome.snapshot,
    }))
}

#[derive(Serialize)]
pub struct PollWithOptions {
    pub poll: PollView,
    pub options: Vec<OptionRow>,
}

/// `PollRow` is a raw DB row reused across components and is not
/// `Serialize` itself; this is the public-facing shape. Deliberately
/// omits `final_snapshot_id`, which is an internal pointer, not something
/// a client needs (results are fetched by slug, not by snapshot id).
#[derive(Serialize)]
pub struct PollView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_name: String,
    pub method: String,
    pub status: String,
    pub share_slug: Option<String>,
    pub closes_at: Option<chrono::DateTime<chrono::Utc>>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<PollRow> for PollView {
    fn from(p: PollRow) -> Self {
        PollView {
            id: p.id,
            title: p.title,
            description: p.description,
            creator_name: p.creator_name,
            method: p.method,
            status: p.status,
            share_slug: p.share_slug,
            closes_at: p.closes_at,
            closed_at: p.closed_at,
            created_at: p.created_at,
        }
    }
}

pub async fn get_poll_admin(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    AdminKeyHeader(admin_key): AdminKeyHeader,
) -> AppResult<Json<PollWithOptions>> {
    let poll = require_admin(&state, &poll_id, &admin_key).await?;
    let options = state.db.list_options(&poll.id).await?;
    Ok(Json(PollWithOptions {
        poll: poll.into(),
        options,
    }))
}

pub async fn get_poll_public(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<PollWithOptions>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    let options = state.db.list_options(&poll.id).await?;
    Ok(Json(PollWithOptions {
        poll: poll.into(),
        options,
    }))
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub title: String,
    pub status: String,
    pub option_count: i64,
    pub ballot_count: i64,
}

pub async fn preview(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<PreviewResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    let option_count = state.db.count_options(&poll.id).await?;
    let ballot_count = state.db.count_ballots(&poll.id).await?;
    Ok(Json(PreviewResponse {
        title: poll.title,
        status: poll.status,
        option_count,
        ballot_count,
    }))
}

#[derive(Serialize)]
pub struct BallotCountResponse {
    pub ballot_count: i64,
}

pub async fn ballot_count(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<BallotCountResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    let ballot_count = state.db.count_ballots(&poll.id).await?;
    Ok(Json(BallotCountResponse { ballot_count }))
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub snapshot: Snapshot,
}

pub async fn results(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ResultsResponse>> {
    let poll = state
        .db
        .get_poll_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound("poll"))?;
    if !poll.is_closed() {
        return Err(AppError::Forbidden);
    }
    let snapshot = state
        .db
        .get_snapshot_for_poll(&poll.id)
        .await?
        .ok_or(AppError::NotFound("snapshot"))?;
    Ok(Json(ResultsResponse { snapshot }))
}
