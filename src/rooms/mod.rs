use crate::{auth::extractors::with_token_renewal, state::AppState};
use axum::{middleware, Router};

pub mod access;
pub mod code;
pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod repo_types;
pub mod services;

/// Room routes authenticate up front so an expired access token can be
/// renewed from `X-Refresh-Token` before the handler runs.
pub fn router(state: AppState) -> Router<AppState> {
    handlers::room_routes().route_layer(middleware::from_fn_with_state(state, with_token_renewal))
}
