//! In-memory stores for tests. They enforce the same unique keys and
//! conditional updates as the Postgres schema.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{StoreError, UniqueKey},
    rooms::{
        code::{CodeSource, RandomCodes},
        model::{PaymentStatus, Room, RoomStatus},
        repo::RoomRepo,
        repo_types::{NewRoom, ParticipantSlot},
    },
    users::{
        repo::UserRepo,
        repo_types::{NewUser, User, UserScope, UserStats},
    },
};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepo {
    fn check_unique(users: &HashMap<Uuid, User>, candidate: &User) -> Result<(), StoreError> {
        for other in users.values().filter(|u| u.id != candidate.id) {
            if other.email == candidate.email {
                return Err(StoreError::Conflict(UniqueKey::Email));
            }
            if other.username == candidate.username {
                return Err(StoreError::Conflict(UniqueKey::Username));
            }
            if candidate.google_id.is_some() && other.google_id == candidate.google_id {
                return Err(StoreError::Conflict(UniqueKey::GoogleId));
            }
        }
        Ok(())
    }

    /// Apply `change` to the stored row only, so columns the caller did
    /// not touch keep whatever value is current.
    fn modify(&self, id: Uuid, change: impl FnOnce(&mut User)) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        let mut next = users.get(&id).cloned().ok_or(StoreError::NotFound)?;
        change(&mut next);
        Self::check_unique(&users, &next)?;
        next.updated_at = OffsetDateTime::now_utc();
        users.insert(id, next.clone());
        Ok(next)
    }

    fn find(&self, scope: UserScope, pred: impl Fn(&User) -> bool) -> Option<User> {
        let users = self.users.lock().unwrap();
        users
            .values()
            .find(|u| scope.admits(u) && pred(u))
            .cloned()
    }
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: new.username,
            password_hash: new.password_hash,
            full_name: new.full_name,
            phone: new.phone,
            role: new.role,
            bank_account_number: None,
            bank_code: None,
            google_id: new.google_id,
            auth_provider: new.auth_provider,
            profile_picture: new.profile_picture,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let mut users = self.users.lock().unwrap();
        Self::check_unique(&users, &user)?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid, scope: UserScope) -> Result<Option<User>, StoreError> {
        Ok(self.find(scope, |u| u.id == id))
    }

    async fn find_by_email(
        &self,
        email: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find(scope, |u| u.email == email))
    }

    async fn find_by_username(
        &self,
        username: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find(scope, |u| u.username == username))
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(UserScope::Any, |u| u.google_id.as_deref() == Some(google_id)))
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        Self::check_unique(&users, user)?;
        let mut stored = user.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_profile(&self, user: &User) -> Result<User, StoreError> {
        self.modify(user.id, |stored| {
            stored.full_name = user.full_name.clone();
            stored.phone = user.phone.clone();
            stored.bank_account_number = user.bank_account_number.clone();
            stored.bank_code = user.bank_code.clone();
        })
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        self.modify(id, |stored| stored.password_hash = Some(password_hash.to_string()))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User, StoreError> {
        self.modify(id, |stored| stored.is_active = active)
    }

    async fn link_google(&self, user: &User) -> Result<User, StoreError> {
        self.modify(user.id, |stored| {
            stored.email = user.email.clone();
            stored.google_id = user.google_id.clone();
            stored.auth_provider = user.auth_provider;
            stored.full_name = user.full_name.clone();
            stored.profile_picture = user.profile_picture.clone();
        })
    }

    async fn list(
        &self,
        scope: UserScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let users = self.users.lock().unwrap();
        let mut all: Vec<User> = users.values().filter(|u| scope.admits(u)).cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&all, limit, offset), all.len() as i64))
    }

    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let needle = query.to_lowercase();
        let users = self.users.lock().unwrap();
        let mut hits: Vec<User> = users
            .values()
            .filter(|u| UserScope::Active.admits(u))
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
                    || u.full_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.username.cmp(&b.username));
        Ok((page(&hits, limit, offset), hits.len() as i64))
    }

    async fn stats(&self, created_since: OffsetDateTime) -> Result<UserStats, StoreError> {
        let users = self.users.lock().unwrap();
        let total = users.len() as i64;
        let active = users.values().filter(|u| u.is_active).count() as i64;
        let recent = users
            .values()
            .filter(|u| u.created_at >= created_since)
            .count() as i64;
        Ok(UserStats {
            total,
            active,
            inactive: total - active,
            recent,
        })
    }
}

#[derive(Default)]
pub struct MemoryRoomRepo {
    rooms: Mutex<HashMap<Uuid, Room>>,
}

impl MemoryRoomRepo {
    pub fn seed(&self, room: Room) {
        self.rooms.lock().unwrap().insert(room.id, room);
    }
}

#[async_trait]
impl RoomRepo for MemoryRoomRepo {
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.values().any(|r| r.room_code == code))
    }

    async fn insert(&self, code: &str, new: &NewRoom) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.values().any(|r| r.room_code == code) {
            return Err(StoreError::Conflict(UniqueKey::RoomCode));
        }
        let now = OffsetDateTime::now_utc();
        let room = Room {
            id: Uuid::new_v4(),
            room_code: code.to_string(),
            creator_id: new.creator_id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            status: RoomStatus::Created,
            payment_status: PaymentStatus::Pending,
            item_title: new.item_title.clone(),
            item_description: new.item_description.clone(),
            item_images: new.item_images.clone(),
            pricing: new.pricing,
            currency: new.currency.clone(),
            tracking_number: None,
            paid_at: None,
            payment_verified_at: None,
            payment_verified_by: None,
            shipped_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            expires_at: Some(new.expires_at),
            closed_at: None,
            created_at: now,
            updated_at: now,
        };
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Room>, StoreError> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.values().find(|r| r.room_code == code).cloned())
    }

    async fn update(&self, room: &Room, expected: RoomStatus) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(&room.id) {
            Some(stored) if stored.status == expected => {
                *stored = room.clone();
                Ok(stored.clone())
            }
            Some(_) => Err(StoreError::Stale),
            None => Err(StoreError::NotFound),
        }
    }

    async fn join(
        &self,
        id: Uuid,
        slot: ParticipantSlot,
        user_id: Uuid,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.lock().unwrap();
        let stored = rooms.get_mut(&id).ok_or(StoreError::NotFound)?;
        let target = match slot {
            ParticipantSlot::Buyer => &mut stored.buyer_id,
            ParticipantSlot::Seller => &mut stored.seller_id,
        };
        if stored.status != RoomStatus::Created || target.is_some() {
            return Err(StoreError::Stale);
        }
        *target = Some(user_id);
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn list_for_participant(
        &self,
        user_id: Uuid,
        status: Option<RoomStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Room>, i64), StoreError> {
        let rooms = self.rooms.lock().unwrap();
        let mut mine: Vec<Room> = rooms
            .values()
            .filter(|r| r.is_participant(user_id))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&mine, limit, offset), mine.len() as i64))
    }
}

/// Hands out a fixed sequence of codes, then falls back to random ones.
pub struct ScriptedCodes {
    queue: Mutex<VecDeque<String>>,
    drawn: AtomicUsize,
}

impl ScriptedCodes {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(codes.into_iter().map(Into::into).collect()),
            drawn: AtomicUsize::new(0),
        }
    }

    pub fn drawn(&self) -> usize {
        self.drawn.load(Ordering::SeqCst)
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> String {
        self.drawn.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RandomCodes.next_code())
    }
}
