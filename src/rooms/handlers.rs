use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery, OptionalJson},
    response::{self, ApiItem, ApiList},
    rooms::{
        access::Identity,
        dto::{CancelRequest, CreateRoomRequest, ListRoomsQuery, RoomView, ShipRequest},
        model::{Room, RoomEvent},
        services,
    },
    state::AppState,
};

pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/list", get(list_rooms))
        .route("/rooms/code/:room_code", get(get_room_by_code))
        .route("/rooms/code/:room_code/join", post(join_room))
        .route("/rooms/:id", get(get_room))
        .route("/rooms/:id/confirm", post(confirm_intent))
        .route("/rooms/:id/verify-payment", post(verify_payment))
        .route("/rooms/:id/ship", post(ship))
        .route("/rooms/:id/complete", post(confirm_receipt))
        .route("/rooms/:id/cancel", post(cancel))
}

async fn render(
    state: &AppState,
    room: &Room,
    title: &str,
    message: &str,
) -> Result<ApiItem<RoomView>, AppError> {
    let view = services::view(state, room).await?;
    Ok(response::item(title, message, view))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<CreateRoomRequest>,
) -> Result<(StatusCode, ApiItem<RoomView>), AppError> {
    let room = services::create(&state, &Identity::from(&user), payload).await?;
    let view = services::view(&state, &room).await?;
    Ok(response::created(
        "Room Created",
        "Transaction room created successfully",
        view,
    ))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListRoomsQuery>,
) -> Result<ApiList<RoomView>, AppError> {
    let (rooms, pagination) = services::list_mine(&state, &Identity::from(&user), query).await?;
    let items = services::views(&state, &rooms).await?;
    Ok(response::list(
        "Rooms Retrieved",
        format!("{} room(s) found", pagination.total),
        items,
        Some(pagination),
    ))
}

pub async fn get_room_by_code(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(room_code): ApiPath<String>,
) -> Result<ApiItem<RoomView>, AppError> {
    let room = services::get_by_code(&state, &Identity::from(&user), &room_code).await?;
    render(&state, &room, "Room Retrieved", "Transaction room retrieved successfully").await
}

pub async fn get_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<RoomView>, AppError> {
    let room = services::get_by_id(&state, &Identity::from(&user), id).await?;
    render(&state, &room, "Room Retrieved", "Transaction room retrieved successfully").await
}

pub async fn join_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(room_code): ApiPath<String>,
) -> Result<ApiItem<RoomView>, AppError> {
    let room = services::join(&state, &Identity::from(&user), &room_code).await?;
    render(&state, &room, "Room Joined", "You have joined the transaction room").await
}

pub async fn confirm_intent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<RoomView>, AppError> {
    let room =
        services::transition(&state, &Identity::from(&user), id, RoomEvent::ConfirmIntent).await?;
    render(&state, &room, "Purchase Confirmed", "Waiting for payment").await
}

pub async fn verify_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<RoomView>, AppError> {
    let event = RoomEvent::VerifyPayment {
        verified_by: user.id,
    };
    let room = services::transition(&state, &Identity::from(&user), id, event).await?;
    render(&state, &room, "Payment Verified", "Payment is now held in escrow").await
}

pub async fn ship(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ShipRequest>,
) -> Result<ApiItem<RoomView>, AppError> {
    let event = RoomEvent::Ship {
        tracking_number: payload.tracking_number,
    };
    let room = services::transition(&state, &Identity::from(&user), id, event).await?;
    render(&state, &room, "Item Shipped", "Shipment recorded successfully").await
}

pub async fn confirm_receipt(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiItem<RoomView>, AppError> {
    let room =
        services::transition(&state, &Identity::from(&user), id, RoomEvent::ConfirmReceipt)
            .await?;
    render(&state, &room, "Transaction Completed", "Payment released to the seller").await
}

/// The body is optional; an empty request cancels without a reason.
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    OptionalJson(payload): OptionalJson<CancelRequest>,
) -> Result<ApiItem<RoomView>, AppError> {
    let reason = payload.and_then(|body| body.reason);
    let event = RoomEvent::Cancel {
        cancelled_by: user.id,
        reason,
    };
    let room = services::transition(&state, &Identity::from(&user), id, event).await?;
    render(&state, &room, "Room Cancelled", "Transaction room cancelled").await
}
