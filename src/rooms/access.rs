//! Who may see a transaction room and who may move it along.

use uuid::Uuid;

use crate::{
    error::AppError,
    rooms::model::{Room, RoomAction},
    users::repo_types::{Role, User},
};

/// The parts of a caller the room policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Admins see every room; anyone else must be its creator, buyer or seller.
/// A missing identity or room never passes.
pub fn can_access(identity: Option<&Identity>, room: Option<&Room>) -> bool {
    match (identity, room) {
        (Some(who), Some(room)) => who.is_admin() || room.is_participant(who.id),
        _ => false,
    }
}

pub fn ensure_access(identity: &Identity, room: &Room) -> Result<(), AppError> {
    if can_access(Some(identity), Some(room)) {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "You do not have access to this transaction room",
        ))
    }
}

/// Which side of the deal may request `action`. Checked after [`ensure_access`].
pub fn ensure_actor(identity: &Identity, room: &Room, action: RoomAction) -> Result<(), AppError> {
    if identity.is_admin() {
        return Ok(());
    }
    let allowed = match action {
        RoomAction::ConfirmIntent | RoomAction::ConfirmReceipt => {
            room.buyer_id == Some(identity.id)
        }
        RoomAction::VerifyPayment | RoomAction::Ship => room.seller_id == Some(identity.id),
        RoomAction::Cancel => room.is_participant(identity.id),
    };
    if allowed {
        Ok(())
    } else {
        let who = match action {
            RoomAction::ConfirmIntent | RoomAction::ConfirmReceipt => "buyer",
            RoomAction::VerifyPayment | RoomAction::Ship => "seller",
            RoomAction::Cancel => "participant",
        };
        Err(AppError::forbidden(format!(
            "Only the room {who} can perform this action"
        )))
    }
}
