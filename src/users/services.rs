use time::{Duration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::password::hash_password,
    config::BootstrapAdmin,
    error::AppError,
    response::{Page, PageQuery, Pagination},
    state::AppState,
    users::{
        dto::{AdminUpdateUserRequest, SearchQuery, UpdateProfileRequest},
        repo_types::{NewUser, Role, User, UserScope, UserStats},
    },
    validation::{
        is_valid_bank_account_number, is_valid_bank_code, is_valid_phone, normalize_email,
        Validator,
    },
};

const MAX_FULL_NAME_LEN: usize = 200;
const MIN_SEARCH_LEN: usize = 2;
const RECENT_DAYS: i64 = 30;

fn tidy(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Apply a profile patch to `user` in place. Every field is validated before
/// anything changes, and the bank pair is checked on the resulting record.
pub fn apply_profile_patch(user: &mut User, patch: UpdateProfileRequest) -> Result<(), AppError> {
    let full_name = patch.full_name.map(tidy);
    let phone = patch.phone.map(tidy);
    let account = patch.bank_account_number.map(tidy);
    let code = patch.bank_code.map(tidy);

    let mut v = Validator::new();
    if let Some(Some(name)) = &full_name {
        v.check(
            name.chars().count() <= MAX_FULL_NAME_LEN,
            "fullName",
            "TOO_LONG",
            "full name must be at most 200 characters",
        );
    }
    if let Some(Some(phone)) = &phone {
        v.check(
            is_valid_phone(phone),
            "phone",
            "INVALID_FORMAT",
            "phone must be 7 to 15 digits, optionally prefixed with +",
        );
    }
    if let Some(Some(account)) = &account {
        v.check(
            is_valid_bank_account_number(account),
            "bankAccountNumber",
            "INVALID_FORMAT",
            "bank account number must be 10 to 12 digits",
        );
    }
    if let Some(Some(code)) = &code {
        v.check(
            is_valid_bank_code(code),
            "bankCode",
            "INVALID_FORMAT",
            "bank code must be exactly 3 digits",
        );
    }

    let next_account = account.clone().unwrap_or_else(|| user.bank_account_number.clone());
    let next_code = code.clone().unwrap_or_else(|| user.bank_code.clone());
    v.check(
        next_account.is_some() == next_code.is_some(),
        "bankCode",
        "BANK_PAIR",
        "bank account number and bank code must be provided together",
    );
    v.finish()?;

    if let Some(name) = full_name {
        user.full_name = name;
    }
    if let Some(phone) = phone {
        user.phone = phone;
    }
    user.bank_account_number = next_account;
    user.bank_code = next_code;
    Ok(())
}

#[instrument(skip(state, user, patch), fields(user_id = %user.id))]
pub async fn update_profile(
    state: &AppState,
    mut user: User,
    patch: UpdateProfileRequest,
) -> Result<User, AppError> {
    apply_profile_patch(&mut user, patch)?;
    let saved = state.users.update_profile(&user).await?;
    info!("profile updated");
    Ok(saved)
}

/// Soft delete: the row stays, every non-admin read path stops seeing it.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn deactivate_self(state: &AppState, user: User) -> Result<(), AppError> {
    state.users.set_active(user.id, false).await?;
    info!("account deactivated by owner");
    Ok(())
}

pub async fn search(
    state: &AppState,
    query: SearchQuery,
) -> Result<(Vec<User>, Pagination), AppError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.chars().count() < MIN_SEARCH_LEN {
        return Err(AppError::invalid(
            "q",
            "TOO_SHORT",
            "Search query must be at least 2 characters long",
        ));
    }
    let page = PageQuery {
        page: query.page,
        per_page: query.limit,
    }
    .resolve(10, 50);
    let (users, total) = state.users.search(q, page.limit(), page.offset()).await?;
    Ok((users, Pagination::new(total, page)))
}

pub async fn public_profile(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id, UserScope::Active)
        .await?
        .ok_or(AppError::NotFound("user"))
}

pub async fn list_users(
    state: &AppState,
    page: Page,
) -> Result<(Vec<User>, Pagination), AppError> {
    let (users, total) = state
        .users
        .list(UserScope::Any, page.limit(), page.offset())
        .await?;
    Ok((users, Pagination::new(total, page)))
}

pub async fn get_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id, UserScope::Any)
        .await?
        .ok_or(AppError::NotFound("user"))
}

#[instrument(skip(state, req), fields(target_id = %id))]
pub async fn admin_update(
    state: &AppState,
    id: Uuid,
    req: AdminUpdateUserRequest,
) -> Result<User, AppError> {
    let mut user = get_user(state, id).await?;
    apply_profile_patch(&mut user, req.profile)?;
    if let Some(role) = req.role {
        user.role = role;
    }
    if let Some(active) = req.is_active {
        user.is_active = active;
    }
    let saved = state.users.update(&user).await?;
    info!(role = ?saved.role, is_active = saved.is_active, "user updated by admin");
    Ok(saved)
}

#[instrument(skip(state), fields(target_id = %id))]
pub async fn set_active(state: &AppState, id: Uuid, active: bool) -> Result<User, AppError> {
    let user = get_user(state, id).await?;
    let saved = state.users.set_active(user.id, active).await?;
    info!(is_active = active, "user activation changed by admin");
    Ok(saved)
}

pub async fn stats(state: &AppState) -> Result<UserStats, AppError> {
    let since = OffsetDateTime::now_utc() - Duration::days(RECENT_DAYS);
    Ok(state.users.stats(since).await?)
}

/// Create the configured administrator unless its email is already taken.
pub async fn ensure_bootstrap_admin(
    state: &AppState,
    admin: &BootstrapAdmin,
) -> anyhow::Result<()> {
    let email = normalize_email(&admin.email);
    if state
        .users
        .find_by_email(&email, UserScope::Any)
        .await?
        .is_some()
    {
        return Ok(());
    }
    let hash = hash_password(&admin.password)?;
    let mut new = NewUser::local(email, admin.username.clone(), hash);
    new.role = Role::Admin;
    let user = state.users.insert(new).await?;
    info!(user_id = %user.id, "bootstrap admin created");
    Ok(())
}
