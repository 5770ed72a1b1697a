use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::rooms::model::{PaymentStatus, Pricing, Room, RoomStatus};

/// Row as stored in `transaction_rooms`.
#[derive(Debug, Clone, FromRow)]
pub struct RoomRow {
    pub id: Uuid,
    pub room_code: String,
    pub creator_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub status: RoomStatus,
    pub payment_status: PaymentStatus,
    pub item_title: String,
    pub item_description: Option<String>,
    pub item_images: Json<Vec<String>>,
    pub quantity: i32,
    pub item_price_cents: i64,
    pub shipping_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub tracking_number: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub payment_verified_at: Option<OffsetDateTime>,
    pub payment_verified_by: Option<Uuid>,
    pub shipped_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub closed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<RoomRow> for Room {
    type Error = anyhow::Error;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        let pricing = Pricing::new(
            row.item_price_cents,
            row.quantity,
            row.shipping_fee_cents,
            row.platform_fee_cents,
        )
        .map_err(|errs| anyhow::anyhow!("room {} has invalid pricing: {errs:?}", row.id))?;
        if pricing.total_cents() != row.total_cents {
            anyhow::bail!(
                "room {} stores total {} but its inputs give {}",
                row.id,
                row.total_cents,
                pricing.total_cents()
            );
        }

        Ok(Room {
            id: row.id,
            room_code: row.room_code,
            creator_id: row.creator_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            status: row.status,
            payment_status: row.payment_status,
            item_title: row.item_title,
            item_description: row.item_description,
            item_images: row.item_images.0,
            pricing,
            currency: row.currency,
            tracking_number: row.tracking_number,
            paid_at: row.paid_at,
            payment_verified_at: row.payment_verified_at,
            payment_verified_by: row.payment_verified_by,
            shipped_at: row.shipped_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
            cancellation_reason: row.cancellation_reason,
            expires_at: row.expires_at,
            closed_at: row.closed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Empty side of a room a newcomer can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantSlot {
    Buyer,
    Seller,
}

impl ParticipantSlot {
    pub fn column(self) -> &'static str {
        match self {
            Self::Buyer => "buyer_id",
            Self::Seller => "seller_id",
        }
    }
}

/// Everything needed to insert a room except its code, which is assigned
/// per attempt.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub creator_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub item_title: String,
    pub item_description: Option<String>,
    pub item_images: Vec<String>,
    pub pricing: Pricing,
    pub currency: String,
    pub expires_at: OffsetDateTime,
}
