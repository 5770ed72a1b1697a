use axum::{
    extract::State,
    routing::{get, put},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::{AuthUser, RequireAdmin},
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::{self, ApiItem, ApiList, PageQuery},
    state::AppState,
    users::{
        dto::{
            AdminUpdateUserRequest, ProfileView, PublicUserView, SearchQuery,
            UpdateProfileRequest, UserStatsView,
        },
        services,
    },
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/profile",
        get(get_profile).put(update_profile).delete(delete_profile),
    )
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/search", get(search_users))
        .route("/users/:id", get(get_public_user))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/stats", get(user_stats))
        .route(
            "/admin/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/admin/users/:id/activate", put(activate_user))
        .route("/admin/users/:id/deactivate", put(deactivate_user))
}

pub async fn get_profile(AuthUser(user): AuthUser) -> ApiItem<ProfileView> {
    response::item(
        "Profile Retrieved",
        "Profile retrieved successfully",
        ProfileView::from(&user),
    )
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<ApiItem<ProfileView>, AppError> {
    let user = services::update_profile(&state, user, payload).await?;
    Ok(response::item(
        "Profile Updated",
        "Profile updated successfully",
        ProfileView::from(&user),
    ))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<ApiItem<()>, AppError> {
    services::deactivate_self(&state, user).await?;
    Ok(response::message(
        "Account Deleted",
        "Account deactivated successfully",
    ))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<ApiList<PublicUserView>, AppError> {
    let (users, pagination) = services::search(&state, query).await?;
    let items: Vec<_> = users.iter().map(PublicUserView::from).collect();
    Ok(response::list(
        "Users Found",
        format!("{} user(s) matched", pagination.total),
        items,
        Some(pagination),
    ))
}

pub async fn get_public_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<PublicUserView>, AppError> {
    let user = services::public_profile(&state, id).await?;
    Ok(response::item(
        "User Retrieved",
        "User retrieved successfully",
        PublicUserView::from(&user),
    ))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiList<ProfileView>, AppError> {
    let (users, pagination) = services::list_users(&state, page.resolve(10, 100)).await?;
    let items: Vec<_> = users.iter().map(ProfileView::from).collect();
    Ok(response::list(
        "Users Retrieved",
        format!("{} user(s) in total", pagination.total),
        items,
        Some(pagination),
    ))
}

pub async fn user_stats(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<ApiItem<UserStatsView>, AppError> {
    let stats = services::stats(&state).await?;
    Ok(response::item(
        "User Statistics",
        "User statistics retrieved successfully",
        UserStatsView::from(stats),
    ))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<ProfileView>, AppError> {
    let user = services::get_user(&state, id).await?;
    Ok(response::item(
        "User Retrieved",
        "User retrieved successfully",
        ProfileView::from(&user),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AdminUpdateUserRequest>,
) -> Result<ApiItem<ProfileView>, AppError> {
    let user = services::admin_update(&state, id, payload).await?;
    Ok(response::item(
        "User Updated",
        "User updated successfully",
        ProfileView::from(&user),
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<()>, AppError> {
    services::set_active(&state, id, false).await?;
    Ok(response::message("User Deleted", "User deleted successfully"))
}

pub async fn activate_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<()>, AppError> {
    services::set_active(&state, id, true).await?;
    Ok(response::message(
        "User Activated",
        "User activated successfully",
    ))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<()>, AppError> {
    services::set_active(&state, id, false).await?;
    Ok(response::message(
        "User Deactivated",
        "User deactivated successfully",
    ))
}
