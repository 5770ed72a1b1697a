use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post, put},
    Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::OAuthStateClaims,
        dto::{
            AuthPayload, ChangePasswordRequest, GoogleCallbackQuery, LoginRequest,
            RefreshRequest, RegisterRequest,
        },
        extractors::AuthUser,
        jwt::{JwtKeys, TokenPair},
        services,
    },
    error::AppError,
    extract::{ApiJson, ApiQuery},
    response::{self, ApiItem},
    state::AppState,
    users::{dto::ProfileView, repo_types::User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/change-password", put(change_password))
}

fn auth_payload(user: &User, tokens: TokenPair) -> AuthPayload {
    AuthPayload {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: ProfileView::from(user),
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, ApiItem<AuthPayload>), AppError> {
    let (user, tokens) = services::register(&state, payload).await?;
    Ok(response::created(
        "Registration Successful",
        "User has been registered successfully",
        auth_payload(&user, tokens),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<ApiItem<AuthPayload>, AppError> {
    let (user, tokens) = services::login(&state, payload).await?;
    Ok(response::item(
        "Login Successful",
        "User has been authenticated successfully",
        auth_payload(&user, tokens),
    ))
}

/// Tokens are stateless; the client drops them.
pub async fn logout() -> ApiItem<()> {
    response::message(
        "Logout Successful",
        "Logout successful. Please remove token from client storage.",
    )
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<ApiItem<AuthPayload>, AppError> {
    let token = payload
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            AppError::invalid("refreshToken", "REQUIRED", "Refresh token is required")
        })?;
    let (user, tokens) = services::refresh(&state, &token).await?;
    Ok(response::item(
        "Token Refreshed",
        "Tokens have been refreshed successfully",
        auth_payload(&user, tokens),
    ))
}

pub async fn get_me(AuthUser(user): AuthUser) -> ApiItem<ProfileView> {
    response::item(
        "User Retrieved",
        "Current user retrieved successfully",
        ProfileView::from(&user),
    )
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<ApiItem<()>, AppError> {
    services::change_password(&state, user, payload).await?;
    Ok(response::message(
        "Password Changed",
        "Password changed successfully",
    ))
}

#[instrument(skip(state))]
pub async fn google_start(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let provider = state.oauth.as_ref().ok_or(AppError::NotFound("Google login"))?;
    let nonce_token = JwtKeys::from_ref(&state).sign_oauth_state()?;
    let url = provider.authorize_url(&nonce_token)?;
    Ok(Redirect::temporary(url.as_str()))
}

#[instrument(skip(state, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<GoogleCallbackQuery>,
) -> Result<ApiItem<AuthPayload>, AppError> {
    let provider = state.oauth.as_ref().ok_or(AppError::NotFound("Google login"))?;
    if let Some(reason) = query.error {
        warn!(%reason, "google consent refused");
        return Err(AppError::AuthenticationFailed);
    }

    let keys = JwtKeys::from_ref(&state);
    let state_token = query.state.ok_or(AppError::TokenInvalid)?;
    keys.verify::<OAuthStateClaims>(&state_token)?;

    let code = query
        .code
        .ok_or_else(|| AppError::invalid("code", "REQUIRED", "authorization code is required"))?;
    let profile = provider.fetch_profile(&code).await.map_err(|e| {
        error!(error = ?e, "google profile exchange failed");
        AppError::AuthenticationFailed
    })?;

    let user = state.auth.exchange_oauth_profile(profile).await?;
    let tokens = keys.issue_pair(&user)?;
    info!(user_id = %user.id, "google login");
    Ok(response::item(
        "Login Successful",
        "User has been authenticated with Google",
        auth_payload(&user, tokens),
    ))
}
