//! Quickly Pick: a group-decision polling service built on Balanced
//! Majority Judgment. See `SPEC_FULL.md` for the full design.

pub mod bmj;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Suggested per-request timeout from spec §5.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/polls", post(handlers::polls::create_poll))
        .route("/polls/:id/options", post(handlers::polls::add_option))
        .route("/polls/:id/publish", post(handlers::polls::publish_poll))
        .route("/polls/:id/close", post(handlers::polls::close_poll))
        .route("/polls/:id/admin", get(handlers::polls::get_poll_admin))
        .route("/polls/:slug", get(handlers::polls::get_poll_public))
        .route("/polls/:slug/preview", get(handlers::polls::preview))
        .route(
            "/polls/:slug/ballot-count",
            get(handlers::polls::ballot_count),
        )
        .route(
            "/polls/:slug/claim-username",
            post(handlers::ballots::claim_username),
        )
        .route(
            "/polls/:slug/ballots",
            post(handlers::ballots::submit_ballot),
        )
        .route("/polls/:slug/my-ballot", get(handlers::ballots::my_ballot))
        .route("/polls/:slug/results", get(handlers::polls::results))
        .route(
            "/devices/register",
            post(handlers::devices::register_device),
        )
        .route("/devices/my-polls", get(handlers::devices::my_polls))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
