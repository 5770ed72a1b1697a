use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::claims::{
        AccessClaims, OAuthStateClaims, RefreshClaims, SignedClaims, TokenClaims, TokenKind,
    },
    config::JwtConfig,
    error::AppError,
    state::AppState,
    users::repo_types::User,
};

const OAUTH_STATE_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("expected a {expected} token, got {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("token invalid")]
    Invalid,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::TypeMismatch { .. } | TokenError::Invalid => AppError::TokenInvalid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes),
        }
    }

    pub fn sign<C: TokenClaims>(&self, claims: &C, ttl: Duration) -> anyhow::Result<String> {
        self.sign_at(claims, ttl, OffsetDateTime::now_utc())
    }

    pub fn sign_at<C: TokenClaims>(
        &self,
        claims: &C,
        ttl: Duration,
        issued_at: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let signed = SignedClaims {
            claims,
            kind: C::KIND,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &signed, &self.encoding)?;
        debug!(kind = C::KIND.as_str(), "jwt signed");
        Ok(token)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }

    /// Verify signature, expiry, issuer and audience, then the `type` claim,
    /// and only then the typed payload.
    pub fn verify<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let data = decode::<serde_json::Value>(token, &self.decoding, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        let found = data.claims.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if found != C::KIND.as_str() {
            debug!(expected = C::KIND.as_str(), found, "jwt type mismatch");
            return Err(TokenError::TypeMismatch {
                expected: C::KIND.as_str(),
                found: found.to_string(),
            });
        }

        let signed: SignedClaims<C> =
            serde_json::from_value(data.claims).map_err(|_| TokenError::Invalid)?;
        debug!(kind = C::KIND.as_str(), "jwt verified");
        Ok(signed.claims)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign(&AccessClaims::from(user), self.access_ttl)
    }

    pub fn sign_refresh(&self, user: &User) -> anyhow::Result<String> {
        self.sign(&RefreshClaims::from(user), self.refresh_ttl)
    }

    pub fn issue_pair(&self, user: &User) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign_access(user)?,
            refresh_token: self.sign_refresh(user)?,
        })
    }

    pub fn sign_oauth_state(&self) -> anyhow::Result<String> {
        let nonce: String = rand::random::<[u8; 16]>()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.sign(&OAuthStateClaims { nonce }, OAUTH_STATE_TTL)
    }
}
