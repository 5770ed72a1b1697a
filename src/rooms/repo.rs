use axum::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    db::StoreError,
    rooms::{
        model::{Room, RoomStatus},
        repo_types::{NewRoom, ParticipantSlot, RoomRow},
    },
};

#[async_trait]
pub trait RoomRepo: Send + Sync {
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;

    /// Insert with the given code; a taken code signals `Conflict(RoomCode)`.
    async fn insert(&self, code: &str, room: &NewRoom) -> Result<Room, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Room>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Room>, StoreError>;

    /// Write the lifecycle columns of `room` only if the stored status is still
    /// `expected`; otherwise `StoreError::Stale`.
    async fn update(&self, room: &Room, expected: RoomStatus) -> Result<Room, StoreError>;

    /// Fill an empty slot of a `CREATED` room; `Stale` when someone got there first.
    async fn join(
        &self,
        id: Uuid,
        slot: ParticipantSlot,
        user_id: Uuid,
    ) -> Result<Room, StoreError>;

    /// Rooms where `user_id` is creator, buyer or seller, newest first.
    async fn list_for_participant(
        &self,
        user_id: Uuid,
        status: Option<RoomStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Room>, i64), StoreError>;
}

const ROOM_COLUMNS: &str = "id, room_code, creator_id, buyer_id, seller_id, status, payment_status, \
     item_title, item_description, item_images, quantity, item_price_cents, shipping_fee_cents, \
     platform_fee_cents, total_cents, currency, tracking_number, paid_at, payment_verified_at, \
     payment_verified_by, shipped_at, completed_at, cancelled_at, cancelled_by, \
     cancellation_reason, expires_at, closed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgRoomRepo {
    db: PgPool,
}

impl PgRoomRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_room(row: RoomRow) -> Result<Room, StoreError> {
    Room::try_from(row).map_err(StoreError::Backend)
}

#[async_trait]
impl RoomRepo for PgRoomRepo {
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transaction_rooms WHERE room_code = $1)")
                .bind(code)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn insert(&self, code: &str, room: &NewRoom) -> Result<Room, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO transaction_rooms (
                id, room_code, creator_id, buyer_id, seller_id, item_title, item_description,
                item_images, quantity, item_price_cents, shipping_fee_cents, platform_fee_cents,
                total_cents, currency, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ROOM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(code)
            .bind(room.creator_id)
            .bind(room.buyer_id)
            .bind(room.seller_id)
            .bind(&room.item_title)
            .bind(&room.item_description)
            .bind(Json(&room.item_images))
            .bind(room.pricing.quantity())
            .bind(room.pricing.item_price_cents())
            .bind(room.pricing.shipping_fee_cents())
            .bind(room.pricing.platform_fee_cents())
            .bind(room.pricing.total_cents())
            .bind(&room.currency)
            .bind(room.expires_at)
            .fetch_one(&self.db)
            .await?;
        into_room(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Room>, StoreError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM transaction_rooms WHERE id = $1");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_room).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Room>, StoreError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM transaction_rooms WHERE room_code = $1");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(code)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_room).transpose()
    }

    async fn update(&self, room: &Room, expected: RoomStatus) -> Result<Room, StoreError> {
        let sql = format!(
            r#"
            UPDATE transaction_rooms
               SET status = $3, payment_status = $4, tracking_number = $5,
                   paid_at = $6, payment_verified_at = $7, payment_verified_by = $8,
                   shipped_at = $9, completed_at = $10, cancelled_at = $11,
                   cancelled_by = $12, cancellation_reason = $13, closed_at = $14,
                   updated_at = $15
             WHERE id = $1 AND status = $2
         RETURNING {ROOM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(room.id)
            .bind(expected)
            .bind(room.status)
            .bind(room.payment_status)
            .bind(&room.tracking_number)
            .bind(room.paid_at)
            .bind(room.payment_verified_at)
            .bind(room.payment_verified_by)
            .bind(room.shipped_at)
            .bind(room.completed_at)
            .bind(room.cancelled_at)
            .bind(room.cancelled_by)
            .bind(&room.cancellation_reason)
            .bind(room.closed_at)
            .bind(room.updated_at)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => into_room(row),
            None => Err(StoreError::Stale),
        }
    }

    async fn join(
        &self,
        id: Uuid,
        slot: ParticipantSlot,
        user_id: Uuid,
    ) -> Result<Room, StoreError> {
        let column = slot.column();
        let sql = format!(
            r#"
            UPDATE transaction_rooms
               SET {column} = $2, updated_at = now()
             WHERE id = $1 AND status = 'CREATED' AND {column} IS NULL
         RETURNING {ROOM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => into_room(row),
            None => Err(StoreError::Stale),
        }
    }

    async fn list_for_participant(
        &self,
        user_id: Uuid,
        status: Option<RoomStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Room>, i64), StoreError> {
        let filter = "(creator_id = $1 OR buyer_id = $1 OR seller_id = $1) \
                      AND ($2::room_status IS NULL OR status = $2)";
        let sql = format!(
            "SELECT {ROOM_COLUMNS} FROM transaction_rooms WHERE {filter} \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let count_sql = format!("SELECT COUNT(*) FROM transaction_rooms WHERE {filter}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(user_id)
            .bind(status)
            .fetch_one(&self.db)
            .await?;
        let rooms = rows
            .into_iter()
            .map(into_room)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rooms, total))
    }
}
