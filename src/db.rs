use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::AppConfig;

/// Columns guarded by a unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Email,
    Username,
    GoogleId,
    RoomCode,
}

impl UniqueKey {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Username => "username",
            Self::GoogleId => "googleId",
            Self::RoomCode => "roomCode",
        }
    }

    /// Constraint names as declared in `migrations/`.
    fn from_constraint(name: &str) -> Option<Self> {
        match name {
            "users_email_key" => Some(Self::Email),
            "users_username_key" => Some(Self::Username),
            "users_google_id_key" => Some(Self::GoogleId),
            "transaction_rooms_room_code_key" => Some(Self::RoomCode),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {}", .0.field())]
    Conflict(UniqueKey),

    /// A conditional update matched no row because the guarded column moved on.
    #[error("record changed since it was read")]
    Stale,

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                if let Some(key) = db.constraint().and_then(UniqueKey::from_constraint) {
                    return Self::Conflict(key);
                }
            }
        }
        Self::Backend(anyhow::Error::new(err))
    }
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")
}
