use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::services::{authenticate_access, authenticate_with_renewal},
    error::AppError,
    state::AppState,
    users::repo_types::User,
};

pub const REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-refresh-token");
pub const NEW_ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-new-access-token");
pub const NEW_REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-new-refresh-token");

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Identity already resolved by [`with_token_renewal`] for this request.
#[derive(Clone)]
struct Authenticated(User);

/// Active user behind the request's access token.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(Authenticated(user)) = parts.extensions.get::<Authenticated>() {
            return Ok(AuthUser(user.clone()));
        }
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            warn!("missing bearer token");
            AppError::TokenInvalid
        })?;
        let user = authenticate_access(state, token).await?;
        Ok(AuthUser(user))
    }
}

/// [`AuthUser`] with the `ADMIN` role.
pub struct RequireAdmin(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user_id = %user.id, "admin route denied");
            return Err(AppError::forbidden(
                "You do not have permission to perform this action",
            ));
        }
        Ok(RequireAdmin(user))
    }
}

/// Authenticates the request, renewing an expired access token when the
/// client also sent `X-Refresh-Token`. A renewed pair is returned in
/// `X-New-Access-Token` / `X-New-Refresh-Token`; the client must adopt it.
pub async fn with_token_renewal(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or(AppError::TokenInvalid)?
        .to_string();
    let refresh = req
        .headers()
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (user, renewed) = authenticate_with_renewal(&state, &token, refresh.as_deref()).await?;
    req.extensions_mut().insert(Authenticated(user));

    let mut res = next.run(req).await;
    if let Some(pair) = renewed {
        let access = HeaderValue::from_str(&pair.access_token).map_err(anyhow::Error::from)?;
        let refresh = HeaderValue::from_str(&pair.refresh_token).map_err(anyhow::Error::from)?;
        res.headers_mut().insert(NEW_ACCESS_TOKEN_HEADER, access);
        res.headers_mut().insert(NEW_REFRESH_TOKEN_HEADER, refresh);
    }
    Ok(res)
}
