use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    rooms::model::{PaymentStatus, Room, RoomStatus},
    users::repo_types::User,
    validation::deserialize_some,
};

/// Create body. `totalCents` is not a field: a request that carries it is
/// rejected rather than silently ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub item_title: String,
    pub item_description: Option<String>,
    pub quantity: Option<i32>,
    pub item_price_cents: i64,
    pub shipping_fee_cents: Option<i64>,
    pub platform_fee_cents: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub item_images: Vec<String>,
    /// `Some` whenever the key is present, `null` included.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub total_cents: Option<Option<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRoomsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    #[serde(alias = "perPage", alias = "limit")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequest {
    pub tracking_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
}

impl From<&User> for ParticipantView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            full_name: u.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Uuid,
    pub room_code: String,
    pub creator_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub creator: Option<ParticipantView>,
    pub buyer: Option<ParticipantView>,
    pub seller: Option<ParticipantView>,
    pub status: RoomStatus,
    pub payment_status: PaymentStatus,
    pub item_title: String,
    pub item_description: Option<String>,
    pub item_images: Vec<String>,
    pub quantity: i32,
    pub item_price_cents: i64,
    pub shipping_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub tracking_number: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub payment_verified_at: Option<OffsetDateTime>,
    pub payment_verified_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub shipped_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Resolved participants of one room.
#[derive(Debug, Default)]
pub struct Participants {
    pub creator: Option<User>,
    pub buyer: Option<User>,
    pub seller: Option<User>,
}

impl RoomView {
    pub fn new(room: &Room, people: &Participants) -> Self {
        Self {
            id: room.id,
            room_code: room.room_code.clone(),
            creator_id: room.creator_id,
            buyer_id: room.buyer_id,
            seller_id: room.seller_id,
            creator: people.creator.as_ref().map(ParticipantView::from),
            buyer: people.buyer.as_ref().map(ParticipantView::from),
            seller: people.seller.as_ref().map(ParticipantView::from),
            status: room.status,
            payment_status: room.payment_status,
            item_title: room.item_title.clone(),
            item_description: room.item_description.clone(),
            item_images: room.item_images.clone(),
            quantity: room.pricing.quantity(),
            item_price_cents: room.pricing.item_price_cents(),
            shipping_fee_cents: room.pricing.shipping_fee_cents(),
            platform_fee_cents: room.pricing.platform_fee_cents(),
            total_cents: room.total_cents(),
            currency: room.currency.clone(),
            tracking_number: room.tracking_number.clone(),
            paid_at: room.paid_at,
            payment_verified_at: room.payment_verified_at,
            payment_verified_by: room.payment_verified_by,
            shipped_at: room.shipped_at,
            completed_at: room.completed_at,
            cancelled_at: room.cancelled_at,
            cancelled_by: room.cancelled_by,
            cancellation_reason: room.cancellation_reason.clone(),
            expires_at: room.expires_at,
            closed_at: room.closed_at,
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}
