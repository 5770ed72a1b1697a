//! Room code generation: 4 random bytes rendered as 8 upper-case hex digits,
//! checked against existing rooms and retried a bounded number of times.

use std::future::Future;

use tracing::{debug, warn};

use crate::{
    db::{StoreError, UniqueKey},
    error::AppError,
    rooms::repo::RoomRepo,
};

pub const ROOM_CODE_LEN: usize = 8;
pub const ROOM_CODE_ATTEMPTS: usize = 5;

/// Source of candidate codes. Swappable so tests can force collisions.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        render(rand::random::<[u8; 4]>())
    }
}

fn render(bytes: [u8; 4]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub fn is_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// User supplied codes are matched case-insensitively.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Draw codes until `insert` succeeds with one nobody holds yet.
///
/// The pre-check against `rooms` only avoids obvious collisions; the unique
/// constraint is what actually guards the code, so a `Conflict(RoomCode)` from
/// `insert` consumes an attempt and tries again. Both kinds of collision share
/// the same budget of [`ROOM_CODE_ATTEMPTS`].
pub async fn assign_unique_code<T, F, Fut>(
    codes: &dyn CodeSource,
    rooms: &dyn RoomRepo,
    mut insert: F,
) -> Result<T, AppError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    for attempt in 1..=ROOM_CODE_ATTEMPTS {
        let code = codes.next_code();
        if rooms.code_exists(&code).await? {
            debug!(attempt, room_code = %code, "room code already taken");
            continue;
        }
        match insert(code.clone()).await {
            Ok(created) => return Ok(created),
            Err(StoreError::Conflict(UniqueKey::RoomCode)) => {
                warn!(attempt, room_code = %code, "room code raced on insert");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::CodeGenerationExhausted)
}
