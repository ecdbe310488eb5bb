//! Device association handlers (C6). Advisory only: losing a device UUID
//! never loses a vote, because the voter token is the authoritative
//! credential (see spec §4.5, §9).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credentials;
use crate::db::devices::MyPollSummary;
use crate::error::{AppError, AppResult};
use crate::extract::DeviceUuidHeader;
use crate::state::AppState;

const VALID_PLATFORMS: &[&str] = &["ios", "macos", "android", "web"];

#[derive(Deserialize)]
pub struct RegisterDeviceRequest {
    pub platform: String,
}

#[derive(Serialize)]
pub struct RegisterDeviceResponse {
    pub device_id: String,
    pub is_new: bool,
}

pub async fn register_device(
    State(state): State<AppState>,
    DeviceUuidHeader(device_uuid): DeviceUuidHeader,
    Json(body): Json<RegisterDeviceRequest>,
) -> AppResult<Json<RegisterDeviceResponse>> {
    let device_uuid = device_uuid.ok_or_else(|| {
        AppError::Validation("X-Device-UUID header is required".into())
    })?;
    if !VALID_PLATFORMS.contains(&body.platform.as_str()) {
        return Err(AppError::Validation(format!(
            "platform must be one of {VALID_PLATFORMS:?}"
        )));
    }

    let new_id = credentials::random_id(16);
    let outcome = state
        .db
        .register_device(&new_id, &device_uuid, &body.platform)
        .await?;

    Ok(Json(RegisterDeviceResponse {
        device_id: outcome.device.id,
        is_new: outcome.is_new,
    }))
}

#[derive(Serialize)]
pub struct MyPollsResponse {
    pub polls: Vec<MyPollSummary>,
}

pub async fn my_polls(
    State(state): State<AppState>,
    DeviceUuidHeader(device_uuid): DeviceUuidHeader,
) -> AppResult<Json<MyPollsResponse>> {
    let device_uuid = device_uuid.ok_or_else(|| {
        AppError::Validation("X-Device-UUID header is required".into())
    })?;
    let polls = state.db.list_my_polls(&device_uuid).await?;
    Ok(Json(MyPollsResponse { polls }))
}
