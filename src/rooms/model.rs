//! Transaction room lifecycle.
//!
//! A room moves `CREATED → PENDING_PAYMENT → PAID → SHIPPED → COMPLETED`, or to
//! `CANCELLED` from any non-terminal state. Every change goes through
//! [`Room::apply`], which consults the transition table in
//! [`RoomStatus::after`] and stamps the matching lifecycle timestamps.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "room_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Created,
    PendingPayment,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Held,
    Released,
    Refunded,
}

/// Lifecycle step a participant can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    ConfirmIntent,
    VerifyPayment,
    Ship,
    ConfirmReceipt,
    Cancel,
}

impl RoomAction {
    #[cfg(test)]
    pub const ALL: [RoomAction; 5] = [
        RoomAction::ConfirmIntent,
        RoomAction::VerifyPayment,
        RoomAction::Ship,
        RoomAction::ConfirmReceipt,
        RoomAction::Cancel,
    ];

    /// Status the action leads to when it is legal.
    pub fn target(self) -> RoomStatus {
        match self {
            Self::ConfirmIntent => RoomStatus::PendingPayment,
            Self::VerifyPayment => RoomStatus::Paid,
            Self::Ship => RoomStatus::Shipped,
            Self::ConfirmReceipt => RoomStatus::Completed,
            Self::Cancel => RoomStatus::Cancelled,
        }
    }
}

impl RoomStatus {
    pub const ALL: [RoomStatus; 6] = [
        RoomStatus::Created,
        RoomStatus::PendingPayment,
        RoomStatus::Paid,
        RoomStatus::Shipped,
        RoomStatus::Completed,
        RoomStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Shipped => "SHIPPED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transition table: `None` means the action is illegal from `self`.
    pub fn after(self, action: RoomAction) -> Option<RoomStatus> {
        use RoomAction as A;
        use RoomStatus as S;
        match (self, action) {
            (S::Created, A::ConfirmIntent) => Some(S::PendingPayment),
            (S::PendingPayment, A::VerifyPayment) => Some(S::Paid),
            (S::Paid, A::Ship) => Some(S::Shipped),
            (S::Shipped, A::ConfirmReceipt) => Some(S::Completed),
            (from, A::Cancel) if !from.is_terminal() => Some(S::Cancelled),
            _ => None,
        }
    }

    pub fn transition(self, action: RoomAction) -> Result<RoomStatus, AppError> {
        self.after(action).ok_or(AppError::InvalidTransition {
            from: self,
            attempted: action.target(),
        })
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| {
                AppError::invalid(
                    "status",
                    "INVALID_STATUS",
                    "Invalid transaction room status filter",
                )
            })
    }
}

/// Price inputs of a room. Fields are private so the total can only come from
/// [`Pricing::new`], which recomputes it every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    item_price_cents: i64,
    quantity: i32,
    shipping_fee_cents: i64,
    platform_fee_cents: i64,
    total_cents: i64,
}

impl Pricing {
    pub fn new(
        item_price_cents: i64,
        quantity: i32,
        shipping_fee_cents: i64,
        platform_fee_cents: i64,
    ) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        if quantity < 1 {
            errors.push(FieldError::new(
                "quantity",
                "OUT_OF_RANGE",
                "quantity must be at least 1",
            ));
        }
        if item_price_cents < 0 {
            errors.push(FieldError::new(
                "itemPriceCents",
                "OUT_OF_RANGE",
                "itemPriceCents must not be negative",
            ));
        }
        if shipping_fee_cents < 0 {
            errors.push(FieldError::new(
                "shippingFeeCents",
                "OUT_OF_RANGE",
                "shippingFeeCents must not be negative",
            ));
        }
        if platform_fee_cents < 0 {
            errors.push(FieldError::new(
                "platformFeeCents",
                "OUT_OF_RANGE",
                "platformFeeCents must not be negative",
            ));
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let total_cents = item_price_cents
            .checked_mul(i64::from(quantity))
            .and_then(|base| base.checked_add(shipping_fee_cents))
            .and_then(|sum| sum.checked_add(platform_fee_cents))
            .ok_or_else(|| {
                vec![FieldError::new(
                    "totalCents",
                    "OVERFLOW",
                    "total amount is too large",
                )]
            })?;

        Ok(Self {
            item_price_cents,
            quantity,
            shipping_fee_cents,
            platform_fee_cents,
            total_cents,
        })
    }

    pub fn item_price_cents(&self) -> i64 {
        self.item_price_cents
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn shipping_fee_cents(&self) -> i64 {
        self.shipping_fee_cents
    }

    pub fn platform_fee_cents(&self) -> i64 {
        self.platform_fee_cents
    }

    pub fn total_cents(&self) -> i64 {
        self.total_cents
    }
}

/// A requested lifecycle step together with the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ConfirmIntent,
    VerifyPayment { verified_by: Uuid },
    Ship { tracking_number: String },
    ConfirmReceipt,
    Cancel { cancelled_by: Uuid, reason: Option<String> },
}

impl RoomEvent {
    pub fn action(&self) -> RoomAction {
        match self {
            Self::ConfirmIntent => RoomAction::ConfirmIntent,
            Self::VerifyPayment { .. } => RoomAction::VerifyPayment,
            Self::Ship { .. } => RoomAction::Ship,
            Self::ConfirmReceipt => RoomAction::ConfirmReceipt,
            Self::Cancel { .. } => RoomAction::Cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub room_code: String,
    pub creator_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub status: RoomStatus,
    pub payment_status: PaymentStatus,
    pub item_title: String,
    pub item_description: Option<String>,
    pub item_images: Vec<String>,
    pub pricing: Pricing,
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

fn stamp(slot: &mut Option<OffsetDateTime>, now: OffsetDateTime) {
    if slot.is_none() {
        *slot = Some(now);
    }
}

impl Room {
    pub fn total_cents(&self) -> i64 {
        self.pricing.total_cents()
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id
            || self.buyer_id == Some(user_id)
            || self.seller_id == Some(user_id)
    }

    /// Apply `event` at `now`. On error the room is left untouched.
    pub fn apply(&mut self, event: RoomEvent, now: OffsetDateTime) -> Result<(), AppError> {
        let next = self.status.transition(event.action())?;

        match event {
            RoomEvent::ConfirmIntent => {
                if self.buyer_id.is_none() || self.seller_id.is_none() {
                    return Err(AppError::invalid(
                        "status",
                        "MISSING_PARTICIPANT",
                        "room needs both a buyer and a seller before payment",
                    ));
                }
            }
            RoomEvent::VerifyPayment { verified_by } => {
                stamp(&mut self.paid_at, now);
                stamp(&mut self.payment_verified_at, now);
                self.payment_verified_by.get_or_insert(verified_by);
                self.payment_status = PaymentStatus::Held;
            }
            RoomEvent::Ship { tracking_number } => {
                let tracking_number = tracking_number.trim().to_string();
                if tracking_number.is_empty() || tracking_number.chars().count() > 120 {
                    return Err(AppError::invalid(
                        "trackingNumber",
                        "REQUIRED",
                        "tracking number is required (max 120 characters)",
                    ));
                }
                self.tracking_number = Some(tracking_number);
                stamp(&mut self.shipped_at, now);
            }
            RoomEvent::ConfirmReceipt => {
                stamp(&mut self.completed_at, now);
                stamp(&mut self.closed_at, now);
                self.payment_status = PaymentStatus::Released;
            }
            RoomEvent::Cancel {
                cancelled_by,
                reason,
            } => {
                stamp(&mut self.cancelled_at, now);
                stamp(&mut self.closed_at, now);
                self.cancelled_by.get_or_insert(cancelled_by);
                self.cancellation_reason = reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty());
                if self.payment_status == PaymentStatus::Held {
                    self.payment_status = PaymentStatus::Refunded;
                }
            }
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
