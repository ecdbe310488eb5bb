//! Header-based auth extractors. Quickly Pick has no account system (see
//! spec.md Non-goals); every request authenticates via exactly one of
//! {admin key, voter token, device UUID} presented as a bare header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

/// `X-Admin-Key` header, required. Verified against a specific poll id by
/// the handler (the poll id lives in the path, not here), so extraction
/// alone only proves the header was present -- see `credentials::verify_admin_key`.
pub struct AdminKeyHeader(pub String);

impl<S> FromRequestParts<S> for AdminKeyHeader
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, "x-admin-key")
            .map(AdminKeyHeader)
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-Admin-Key header"))
    }
}

/// `X-Voter-Token` header, required.
pub struct VoterTokenHeader(pub String);

impl<S> FromRequestParts<S> for VoterTokenHeader
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, "x-voter-token")
            .map(VoterTokenHeader)
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-Voter-Token header"))
    }
}

/// `X-Device-UUID` header, optional everywhere it appears. The server
/// never creates device UUIDs; it only ever reads a client-supplied one.
pub struct DeviceUuidHeader(pub Option<String>);

impl<S> FromRequestParts<S> for DeviceUuidHeader
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(DeviceUuidHeader(header_value(parts, "x-device-uuid")))
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}
