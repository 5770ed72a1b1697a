use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    users::repo_types::{AuthProvider, Role, User, UserStats},
    validation::deserialize_some,
};

/// Everything the account owner (or an admin) may see about an account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub bank_account_number: Option<String>,
    pub bank_code: Option<String>,
    pub has_payout_method: bool,
    pub auth_provider: AuthProvider,
    pub profile_picture: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for ProfileView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            username: u.username.clone(),
            full_name: u.full_name.clone(),
            phone: u.phone.clone(),
            role: u.role,
            bank_account_number: u.bank_account_number.clone(),
            bank_code: u.bank_code.clone(),
            has_payout_method: u.has_payout_method(),
            auth_provider: u.auth_provider,
            profile_picture: u.profile_picture.clone(),
            is_active: u.is_active,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// What other users see. No contact or payout data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserView {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub profile_picture: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            full_name: u.full_name.clone(),
            role: u.role,
            profile_picture: u.profile_picture.clone(),
            created_at: u.created_at,
        }
    }
}

/// Absent field = leave unchanged, `null` = clear.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub bank_account_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub bank_code: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    #[serde(flatten)]
    pub profile: UpdateProfileRequest,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsView {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub recent_users: i64,
    pub active_percentage: String,
    pub inactive_percentage: String,
}

fn percentage(part: i64, total: i64) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", part as f64 * 100.0 / total as f64)
}

impl From<UserStats> for UserStatsView {
    fn from(s: UserStats) -> Self {
        Self {
            total_users: s.total,
            active_users: s.active,
            inactive_users: s.inactive,
            recent_users: s.recent,
            active_percentage: percentage(s.active, s.total),
            inactive_percentage: percentage(s.inactive, s.total),
        }
    }
}
