use std::{fmt::Display, ops::RangeInclusive, str::FromStr};

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Google OAuth client. Present only when both id and secret are configured.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Optional administrator created at startup when no account owns the email yet.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt: JwtConfig,
    pub room_ttl_hours: i64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub google: Option<GoogleOAuthConfig>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "gunkong".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "gunkong-users".into()),
            ttl_minutes: env_bounded("JWT_TTL_MINUTES", 15, 1..=24 * 60)?,
            refresh_ttl_minutes: env_bounded(
                "JWT_REFRESH_TTL_MINUTES",
                60 * 24 * 7,
                1..=60 * 24 * 365,
            )?,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS").ok().map(|v| {
            v.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect::<Vec<_>>()
        });

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) if !client_id.is_empty() && !client_secret.is_empty() => {
                Some(GoogleOAuthConfig {
                    client_id,
                    client_secret,
                    callback_url: std::env::var("GOOGLE_CALLBACK_URL")
                        .unwrap_or_else(|_| "http://localhost:8000/api/auth/google/callback".into()),
                })
            }
            _ => None,
        };

        let bootstrap_admin = match (
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(BootstrapAdmin {
                email,
                username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            max_connections: env_bounded("DATABASE_MAX_CONNECTIONS", 10, 1..=1000)?,
            jwt,
            room_ttl_hours: env_bounded("ROOM_TTL_HOURS", 72, 1..=24 * 365)?,
            cors_allowed_origins,
            google,
            bootstrap_admin,
        })
    }
}

fn env_bounded<T>(key: &str, default: T, range: RangeInclusive<T>) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_bounded(key, std::env::var(key).ok().as_deref(), default, range)
}

/// Unset or blank means `default`; anything else must parse and fall inside `range`.
fn parse_bounded<T>(
    key: &str,
    raw: Option<&str>,
    default: T,
    range: RangeInclusive<T>,
) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    let value: T = raw
        .parse()
        .with_context(|| format!("{key} must be a number, got {raw:?}"))?;
    if !range.contains(&value) {
        bail!(
            "{key} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        );
    }
    Ok(value)
}
