use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_provider", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProvider {
    Local,
    Google,
}

/// User record in the database. Not `Serialize`: responses go
/// through the view structs in `users::dto`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>, // Argon2 PHC string; None for OAuth-only accounts
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub bank_account_number: Option<String>,
    pub bank_code: Option<String>,
    pub google_id: Option<String>,
    pub auth_provider: AuthProvider,
    pub profile_picture: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_payout_method(&self) -> bool {
        self.bank_account_number.is_some() && self.bank_code.is_some()
    }
}

/// Insert payload; id and timestamps are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub google_id: Option<String>,
    pub auth_provider: AuthProvider,
    pub profile_picture: Option<String>,
}

impl NewUser {
    pub fn local(email: String, username: String, password_hash: String) -> Self {
        Self {
            email,
            username,
            password_hash: Some(password_hash),
            full_name: None,
            phone: None,
            role: Role::User,
            google_id: None,
            auth_provider: AuthProvider::Local,
            profile_picture: None,
        }
    }
}

/// Which accounts a read may see. Deactivated accounts are hidden from every
/// read path except admin lookups and token resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    Active,
    Any,
}

impl UserScope {
    /// SQL predicate over the `users` table.
    pub fn predicate(self) -> &'static str {
        match self {
            Self::Active => "is_active = TRUE",
            Self::Any => "TRUE",
        }
    }

    /// In-memory counterpart of [`UserScope::predicate`].
    #[cfg(test)]
    pub fn admits(self, user: &User) -> bool {
        match self {
            Self::Active => user.is_active,
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub recent: i64,
}
