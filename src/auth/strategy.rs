//! Ways of proving who you are. The set of active strategies is decided by
//! configuration and carried in `AppState`.

use std::sync::Arc;

use axum::async_trait;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::{
        oauth::OAuthProfile,
        password::{verify_nothing, verify_password},
    },
    error::AppError,
    users::{
        repo::UserRepo,
        repo_types::{AuthProvider, NewUser, Role, User, UserScope},
    },
    validation::normalize_email,
};

/// Login input; `identifier` is either an email or a username.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Resolve credentials to an active user. Every failure is the same
    /// `AuthenticationFailed`.
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<User, AppError>;

    /// Find, link or create the account for an external profile.
    async fn exchange_oauth_profile(&self, profile: OAuthProfile) -> Result<User, AppError>;
}

pub struct StoreAuthStrategy {
    users: Arc<dyn UserRepo>,
}

impl StoreAuthStrategy {
    pub fn new(users: Arc<dyn UserRepo>) -> Self {
        Self { users }
    }
}

/// `somchai.j@example.com` → `somchai_j_1729240000000`.
fn oauth_username(email: &str, now: OffsetDateTime) -> String {
    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(80)
        .collect();
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{local}_{millis}")
}

#[async_trait]
impl AuthStrategy for StoreAuthStrategy {
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<User, AppError> {
        let identifier = credentials.identifier.trim();
        let found = if identifier.contains('@') {
            self.users
                .find_by_email(&normalize_email(identifier), UserScope::Any)
                .await?
        } else {
            self.users
                .find_by_username(identifier, UserScope::Any)
                .await?
        };

        let Some(user) = found else {
            verify_nothing(&credentials.password);
            warn!("login failed: unknown identifier");
            return Err(AppError::AuthenticationFailed);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            verify_nothing(&credentials.password);
            warn!(user_id = %user.id, "login failed: account has no password");
            return Err(AppError::AuthenticationFailed);
        };
        if !verify_password(&credentials.password, hash)? {
            warn!(user_id = %user.id, "login failed: wrong password");
            return Err(AppError::AuthenticationFailed);
        }
        if !user.is_active {
            warn!(user_id = %user.id, "login failed: account deactivated");
            return Err(AppError::AuthenticationFailed);
        }
        Ok(user)
    }

    async fn exchange_oauth_profile(&self, profile: OAuthProfile) -> Result<User, AppError> {
        let Some(email) = profile.email.as_deref().map(normalize_email) else {
            warn!(provider_id = %profile.provider_id, "oauth profile has no email");
            return Err(AppError::AuthenticationFailed);
        };

        let user = if let Some(mut user) = self.users.find_by_google_id(&profile.provider_id).await? {
            user.full_name = profile.full_name.or(user.full_name);
            user.profile_picture = profile.picture.or(user.profile_picture);
            if profile.email_verified {
                user.email = email;
            }
            self.users.link_google(&user).await?
        } else if !profile.email_verified {
            warn!(provider_id = %profile.provider_id, "oauth email not verified by provider");
            return Err(AppError::AuthenticationFailed);
        } else if let Some(mut user) = self.users.find_by_email(&email, UserScope::Any).await? {
            if user.auth_provider == AuthProvider::Local {
                user.google_id = Some(profile.provider_id.clone());
                user.auth_provider = AuthProvider::Google;
                user.profile_picture = profile.picture.or(user.profile_picture);
                user.full_name = profile.full_name.or(user.full_name);
                let linked = self.users.link_google(&user).await?;
                info!(user_id = %linked.id, "google account linked to existing user");
                linked
            } else {
                user
            }
        } else {
            let created = self
                .users
                .insert(NewUser {
                    username: oauth_username(&email, OffsetDateTime::now_utc()),
                    email,
                    password_hash: None,
                    full_name: profile.full_name,
                    phone: None,
                    role: Role::User,
                    google_id: Some(profile.provider_id),
                    auth_provider: AuthProvider::Google,
                    profile_picture: profile.picture,
                })
                .await?;
            info!(user_id = %created.id, "user registered through google");
            created
        };

        if !user.is_active {
            return Err(AppError::forbidden("Account is deactivated"));
        }
        Ok(user)
    }
}
