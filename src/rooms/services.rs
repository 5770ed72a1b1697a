use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::StoreError,
    error::{AppError, FieldError},
    response::{Page, PageQuery, Pagination},
    rooms::{
        access::{ensure_access, ensure_actor, Identity},
        code::{assign_unique_code, is_room_code, normalize},
        dto::{CreateRoomRequest, ListRoomsQuery, Participants, RoomView},
        model::{Pricing, Room, RoomEvent, RoomStatus},
        repo_types::{NewRoom, ParticipantSlot},
    },
    state::AppState,
    users::repo_types::UserScope,
    validation::{is_http_url, is_valid_currency, Validator},
};

const MAX_TITLE_LEN: usize = 255;
const MAX_IMAGES: usize = 10;
const DEFAULT_CURRENCY: &str = "THB";

fn tidy(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validate a create request into the row to insert. Counterparts are only
/// checked for shape here; [`create`] resolves them against the store.
pub fn prepare(
    creator_id: Uuid,
    req: CreateRoomRequest,
    now: OffsetDateTime,
    ttl_hours: i64,
) -> Result<NewRoom, AppError> {
    let title = req.item_title.trim().to_string();
    let currency = req
        .currency
        .map(|c| c.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut v = Validator::new();
    v.check(
        req.total_cents.is_none(),
        "totalCents",
        "NOT_ALLOWED",
        "totalCents is computed by the server",
    );
    v.check(
        !title.is_empty() && title.chars().count() <= MAX_TITLE_LEN,
        "itemTitle",
        "OUT_OF_RANGE",
        "item title must be 1 to 255 characters",
    );
    v.check(
        req.item_price_cents >= 1,
        "itemPriceCents",
        "OUT_OF_RANGE",
        "itemPriceCents must be at least 1",
    );
    v.check(
        is_valid_currency(&currency),
        "currency",
        "INVALID_FORMAT",
        "currency must be 3 upper-case letters",
    );
    v.check(
        req.item_images.len() <= MAX_IMAGES,
        "itemImages",
        "TOO_MANY",
        "at most 10 item images are allowed",
    );
    v.check(
        req.item_images.iter().all(|url| is_http_url(url)),
        "itemImages",
        "INVALID_FORMAT",
        "item images must be http(s) URLs",
    );

    let buyer_id = req.buyer_id;
    // The creator sells unless they are the one buying.
    let seller_id = req
        .seller_id
        .or((buyer_id != Some(creator_id)).then_some(creator_id));
    v.check(
        buyer_id.is_none() || buyer_id != seller_id,
        "sellerId",
        "SAME_PARTY",
        "buyer and seller must be different users",
    );

    let pricing = Pricing::new(
        req.item_price_cents,
        req.quantity.unwrap_or(1),
        req.shipping_fee_cents.unwrap_or(0),
        req.platform_fee_cents.unwrap_or(0),
    );
    let pricing = match pricing {
        Ok(p) => Some(p),
        Err(errors) => {
            for e in errors {
                v.push(e);
            }
            None
        }
    };
    v.finish()?;
    let pricing = pricing.ok_or_else(|| anyhow::anyhow!("pricing missing after validation"))?;

    Ok(NewRoom {
        creator_id,
        buyer_id,
        seller_id,
        item_title: title,
        item_description: tidy(req.item_description),
        item_images: req.item_images,
        pricing,
        currency,
        expires_at: now + Duration::hours(ttl_hours),
    })
}

async fn ensure_counterpart(
    state: &AppState,
    id: Option<Uuid>,
    field: &str,
) -> Result<Option<FieldError>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    let found = state.users.find_by_id(id, UserScope::Active).await?;
    Ok(found.is_none().then(|| {
        FieldError::new(field, "NOT_FOUND", format!("{field} does not reference an active user"))
    }))
}

#[instrument(skip(state, identity, req), fields(user_id = %identity.id))]
pub async fn create(
    state: &AppState,
    identity: &Identity,
    req: CreateRoomRequest,
) -> Result<Room, AppError> {
    let new = prepare(
        identity.id,
        req,
        OffsetDateTime::now_utc(),
        state.config.room_ttl_hours,
    )?;

    let mut v = Validator::new();
    if let Some(e) = ensure_counterpart(state, new.buyer_id, "buyerId").await? {
        v.push(e);
    }
    if new.seller_id != Some(identity.id) {
        if let Some(e) = ensure_counterpart(state, new.seller_id, "sellerId").await? {
            v.push(e);
        }
    }
    v.finish()?;

    let (rooms, new) = (state.rooms.as_ref(), &new);
    let room = assign_unique_code(state.codes.as_ref(), rooms, |code| async move {
        rooms.insert(&code, new).await
    })
    .await?;

    info!(room_id = %room.id, room_code = %room.room_code, total_cents = room.total_cents(), "room created");
    Ok(room)
}

pub async fn get_by_id(state: &AppState, identity: &Identity, id: Uuid) -> Result<Room, AppError> {
    let room = state
        .rooms
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("transaction room"))?;
    ensure_access(identity, &room)?;
    Ok(room)
}

pub async fn get_by_code(
    state: &AppState,
    identity: &Identity,
    code: &str,
) -> Result<Room, AppError> {
    let room = find_by_code(state, code).await?;
    ensure_access(identity, &room)?;
    Ok(room)
}

async fn find_by_code(state: &AppState, code: &str) -> Result<Room, AppError> {
    let code = normalize(code);
    if !is_room_code(&code) {
        return Err(AppError::NotFound("transaction room"));
    }
    state
        .rooms
        .find_by_code(&code)
        .await?
        .ok_or(AppError::NotFound("transaction room"))
}

pub async fn list_mine(
    state: &AppState,
    identity: &Identity,
    query: ListRoomsQuery,
) -> Result<(Vec<Room>, Pagination), AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<RoomStatus>())
        .transpose()?;
    let page: Page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(10, 50);
    let (rooms, total) = state
        .rooms
        .list_for_participant(identity.id, status, page.limit(), page.offset())
        .await?;
    Ok((rooms, Pagination::new(total, page)))
}

/// Take the first open slot of a `CREATED` room, buyer before seller.
#[instrument(skip(state, identity), fields(user_id = %identity.id))]
pub async fn join(state: &AppState, identity: &Identity, code: &str) -> Result<Room, AppError> {
    let room = find_by_code(state, code).await?;

    if room.is_participant(identity.id) {
        return Err(AppError::Conflict {
            field: "roomCode",
            message: "You are already a participant in this room".to_string(),
        });
    }
    let closed = || AppError::Conflict {
        field: "roomCode",
        message: "This room is no longer open for joining".to_string(),
    };
    if room.status != RoomStatus::Created {
        return Err(closed());
    }
    let slot = if room.buyer_id.is_none() {
        ParticipantSlot::Buyer
    } else if room.seller_id.is_none() {
        ParticipantSlot::Seller
    } else {
        return Err(closed());
    };

    let joined = match state.rooms.join(room.id, slot, identity.id).await {
        Ok(joined) => joined,
        Err(StoreError::Stale) => {
            warn!(room_code = %room.room_code, "join lost a race for the slot");
            return Err(closed());
        }
        Err(e) => return Err(e.into()),
    };
    info!(room_code = %joined.room_code, slot = ?slot, "room joined");
    Ok(joined)
}

/// Access, then actor role, then the transition table; the write only lands if
/// nobody moved the room in between.
#[instrument(skip(state, identity, event), fields(user_id = %identity.id, action = ?event.action()))]
pub async fn transition(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    event: RoomEvent,
) -> Result<Room, AppError> {
    let mut room = get_by_id(state, identity, id).await?;
    ensure_actor(identity, &room, event.action())?;

    let expected = room.status;
    room.apply(event, OffsetDateTime::now_utc())?;
    let saved = state.rooms.update(&room, expected).await?;
    info!(room_code = %saved.room_code, from = %expected, to = %saved.status, "room transitioned");
    Ok(saved)
}

/// Participants are resolved without the soft-delete filter so a deactivated
/// counterpart still shows up in rooms they took part in.
pub async fn view(state: &AppState, room: &Room) -> Result<RoomView, AppError> {
    let lookup = |id: Option<Uuid>| async move {
        match id {
            Some(id) => state.users.find_by_id(id, UserScope::Any).await,
            None => Ok(None),
        }
    };
    let people = Participants {
        creator: lookup(Some(room.creator_id)).await?,
        buyer: lookup(room.buyer_id).await?,
        seller: lookup(room.seller_id).await?,
    };
    Ok(RoomView::new(room, &people))
}

pub async fn views(state: &AppState, rooms: &[Room]) -> Result<Vec<RoomView>, AppError> {
    let mut out = Vec::with_capacity(rooms.len());
    for room in rooms {
        out.push(view(state, room).await?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        memory::ScriptedCodes,
        rooms::model::PaymentStatus,
        state::tests::{fake_state, seed_admin, seed_user},
        users::repo_types::User,
    };
    use time::macros::datetime;

    fn request(json: serde_json::Value) -> CreateRoomRequest {
        serde_json::from_value(json).unwrap()
    }

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors.into_iter().filter_map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    async fn parties(state: &AppState) -> (User, User) {
        let seller = seed_user(state, "seller@example.com", "seller", "secret123").await;
        let buyer = seed_user(state, "buyer@example.com", "buyer", "secret123").await;
        (seller, buyer)
    }

    async fn open_room(state: &AppState, seller: &User, buyer: &User) -> Room {
        create(
            state,
            &Identity::from(seller),
            request(serde_json::json!({
                "buyerId": buyer.id,
                "itemTitle": "Film camera",
                "itemPriceCents": 10000,
                "quantity": 2,
                "shippingFeeCents": 500,
                "platformFeeCents": 200
            })),
        )
        .await
        .unwrap()
    }

    #[test]
    fn prepare_fills_defaults() {
        let creator = Uuid::new_v4();
        let now = datetime!(2024-10-18 09:00 UTC);
        let new = prepare(
            creator,
            request(serde_json::json!({"itemTitle": " Lamp ", "itemPriceCents": 500})),
            now,
            72,
        )
        .unwrap();
        assert_eq!(new.item_title, "Lamp");
        assert_eq!(new.currency, "THB");
        assert_eq!(new.pricing.quantity(), 1);
        assert_eq!(new.pricing.total_cents(), 500);
        assert_eq!(new.seller_id, Some(creator));
        assert_eq!(new.buyer_id, None);
        assert_eq!(new.expires_at, datetime!(2024-10-21 09:00 UTC));
    }

    #[test]
    fn explicit_null_total_is_still_rejected() {
        let err = prepare(
            Uuid::new_v4(),
            request(serde_json::json!({
                "itemTitle": "Lamp",
                "itemPriceCents": 500,
                "totalCents": null
            })),
            OffsetDateTime::now_utc(),
            72,
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["totalCents".to_string()]);
    }

    #[test]
    fn creator_buying_leaves_seller_open() {
        let creator = Uuid::new_v4();
        let new = prepare(
            creator,
            request(serde_json::json!({
                "buyerId": creator, "itemTitle": "Lamp", "itemPriceCents": 500
            })),
            OffsetDateTime::now_utc(),
            72,
        )
        .unwrap();
        assert_eq!(new.buyer_id, Some(creator));
        assert_eq!(new.seller_id, None);
    }

    #[test]
    fn prepare_collects_every_problem() {
        let err = prepare(
            Uuid::new_v4(),
            request(serde_json::json!({
                "itemTitle": "  ",
                "itemPriceCents": 0,
                "quantity": 0,
                "currency": "thb",
                "itemImages": ["ftp://x/y.png"],
                "totalCents": 1
            })),
            OffsetDateTime::now_utc(),
            72,
        )
        .unwrap_err();
        let got = fields(err);
        for field in [
            "totalCents",
            "itemTitle",
            "itemPriceCents",
            "currency",
            "itemImages",
            "quantity",
        ] {
            assert!(got.iter().any(|f| f == field), "missing {field} in {got:?}");
        }
    }

    #[test]
    fn overflowing_total_is_a_validation_error() {
        let err = prepare(
            Uuid::new_v4(),
            request(serde_json::json!({
                "itemTitle": "Gold", "itemPriceCents": i64::MAX, "quantity": 2
            })),
            OffsetDateTime::now_utc(),
            72,
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["totalCents".to_string()]);
    }

    #[test]
    fn same_buyer_and_seller_is_rejected() {
        let other = Uuid::new_v4();
        let err = prepare(
            Uuid::new_v4(),
            request(serde_json::json!({
                "buyerId": other, "sellerId": other, "itemTitle": "Lamp", "itemPriceCents": 500
            })),
            OffsetDateTime::now_utc(),
            72,
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["sellerId".to_string()]);
    }

    #[tokio::test]
    async fn create_computes_total_and_initial_state() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let room = open_room(&state, &seller, &buyer).await;

        assert_eq!(room.total_cents(), 20_700);
        assert_eq!(room.status, RoomStatus::Created);
        assert_eq!(room.payment_status, PaymentStatus::Pending);
        assert!(is_room_code(&room.room_code));
        assert_eq!(room.creator_id, seller.id);
        assert_eq!(room.seller_id, Some(seller.id));
        assert_eq!(room.buyer_id, Some(buyer.id));
        assert!(room.expires_at.is_some());
    }

    #[tokio::test]
    async fn unknown_or_inactive_counterpart_is_rejected() {
        let state = fake_state();
        let (seller, mut buyer) = parties(&state).await;
        buyer.is_active = false;
        state.users.update(&buyer).await.unwrap();

        let err = create(
            &state,
            &Identity::from(&seller),
            request(serde_json::json!({
                "buyerId": buyer.id, "itemTitle": "Lamp", "itemPriceCents": 500
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(fields(err), vec!["buyerId".to_string()]);
    }

    #[tokio::test]
    async fn create_retries_taken_codes() {
        let mut state = fake_state();
        state.codes = Arc::new(ScriptedCodes::new(["AAAAAAAA", "AAAAAAAA", "BBBBBBBB"]));
        let (seller, buyer) = parties(&state).await;

        let first = open_room(&state, &seller, &buyer).await;
        let second = open_room(&state, &seller, &buyer).await;
        assert_eq!(first.room_code, "AAAAAAAA");
        assert_eq!(second.room_code, "BBBBBBBB");
    }

    #[tokio::test]
    async fn create_gives_up_after_five_collisions() {
        let mut state = fake_state();
        state.codes = Arc::new(ScriptedCodes::new(["CCCCCCCC"; 7]));
        let (seller, buyer) = parties(&state).await;
        open_room(&state, &seller, &buyer).await;

        let err = create(
            &state,
            &Identity::from(&seller),
            request(serde_json::json!({"itemTitle": "Lamp", "itemPriceCents": 500})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::CodeGenerationExhausted));
    }

    #[tokio::test]
    async fn reads_are_gated_and_codes_case_insensitive() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let stranger = seed_user(&state, "x@example.com", "stranger", "secret123").await;
        let admin = seed_admin(&state, "root").await;
        let room = open_room(&state, &seller, &buyer).await;

        let lower = room.room_code.to_ascii_lowercase();
        let found = get_by_code(&state, &Identity::from(&buyer), &lower)
            .await
            .unwrap();
        assert_eq!(found.id, room.id);
        get_by_id(&state, &Identity::from(&admin), room.id)
            .await
            .unwrap();

        let err = get_by_id(&state, &Identity::from(&stranger), room.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = get_by_code(&state, &Identity::from(&buyer), "FFFFFFFF")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_with_role_checks() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let room = open_room(&state, &seller, &buyer).await;
        let as_buyer = Identity::from(&buyer);
        let as_seller = Identity::from(&seller);

        let err = transition(&state, &as_seller, room.id, RoomEvent::ConfirmIntent)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let room = transition(&state, &as_buyer, room.id, RoomEvent::ConfirmIntent)
            .await
            .unwrap();
        assert_eq!(room.status, RoomStatus::PendingPayment);

        let room = transition(
            &state,
            &as_seller,
            room.id,
            RoomEvent::VerifyPayment {
                verified_by: seller.id,
            },
        )
        .await
        .unwrap();
        assert_eq!(room.payment_status, PaymentStatus::Held);
        assert_eq!(room.payment_verified_by, Some(seller.id));
        assert!(room.paid_at.is_some());

        let room = transition(
            &state,
            &as_seller,
            room.id,
            RoomEvent::Ship {
                tracking_number: " TH123456789 ".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(room.tracking_number.as_deref(), Some("TH123456789"));

        let room = transition(&state, &as_buyer, room.id, RoomEvent::ConfirmReceipt)
            .await
            .unwrap();
        assert_eq!(room.status, RoomStatus::Completed);
        assert_eq!(room.payment_status, PaymentStatus::Released);
        assert!(room.closed_at.is_some());

        let err = transition(
            &state,
            &as_buyer,
            room.id,
            RoomEvent::Cancel {
                cancelled_by: buyer.id,
                reason: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_after_payment_refunds() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let room = open_room(&state, &seller, &buyer).await;
        let as_buyer = Identity::from(&buyer);
        transition(&state, &as_buyer, room.id, RoomEvent::ConfirmIntent)
            .await
            .unwrap();
        transition(
            &state,
            &Identity::from(&seller),
            room.id,
            RoomEvent::VerifyPayment {
                verified_by: seller.id,
            },
        )
        .await
        .unwrap();

        let room = transition(
            &state,
            &as_buyer,
            room.id,
            RoomEvent::Cancel {
                cancelled_by: buyer.id,
                reason: Some("changed my mind".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(room.status, RoomStatus::Cancelled);
        assert_eq!(room.payment_status, PaymentStatus::Refunded);
        assert_eq!(room.cancelled_by, Some(buyer.id));
        assert_eq!(room.cancellation_reason.as_deref(), Some("changed my mind"));
    }

    #[tokio::test]
    async fn stale_transition_is_a_conflict() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let room = open_room(&state, &seller, &buyer).await;

        // a second writer computed from CREATED after the room moved on
        let mut stale = room.clone();
        transition(&state, &Identity::from(&buyer), room.id, RoomEvent::ConfirmIntent)
            .await
            .unwrap();
        stale
            .apply(
                RoomEvent::Cancel {
                    cancelled_by: seller.id,
                    reason: None,
                },
                OffsetDateTime::now_utc(),
            )
            .unwrap();
        let err: AppError = state
            .rooms
            .update(&stale, RoomStatus::Created)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Conflict { field: "status", .. }));
    }

    #[tokio::test]
    async fn join_grants_access_on_next_read() {
        let state = fake_state();
        let seller = seed_user(&state, "seller@example.com", "seller", "secret123").await;
        let buyer = seed_user(&state, "buyer@example.com", "buyer", "secret123").await;
        let late = seed_user(&state, "late@example.com", "late", "secret123").await;
        let room = create(
            &state,
            &Identity::from(&seller),
            request(serde_json::json!({"itemTitle": "Lamp", "itemPriceCents": 500})),
        )
        .await
        .unwrap();

        let as_buyer = Identity::from(&buyer);
        assert!(get_by_id(&state, &as_buyer, room.id).await.is_err());

        let joined = join(&state, &as_buyer, &room.room_code.to_ascii_lowercase())
            .await
            .unwrap();
        assert_eq!(joined.buyer_id, Some(buyer.id));
        get_by_id(&state, &as_buyer, room.id).await.unwrap();

        let err = join(&state, &as_buyer, &room.room_code).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        let err = join(&state, &Identity::from(&late), &room.room_code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_participant_and_status() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let stranger = seed_user(&state, "x@example.com", "stranger", "secret123").await;
        let first = open_room(&state, &seller, &buyer).await;
        open_room(&state, &seller, &buyer).await;
        transition(&state, &Identity::from(&buyer), first.id, RoomEvent::ConfirmIntent)
            .await
            .unwrap();

        let (rooms, page) = list_mine(&state, &Identity::from(&buyer), ListRoomsQuery::default())
            .await
            .unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(page.total, 2);

        let query = ListRoomsQuery {
            status: Some("pending_payment".into()),
            ..Default::default()
        };
        let (rooms, _) = list_mine(&state, &Identity::from(&seller), query)
            .await
            .unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, first.id);

        let (rooms, _) = list_mine(&state, &Identity::from(&stranger), ListRoomsQuery::default())
            .await
            .unwrap();
        assert!(rooms.is_empty());

        let query = ListRoomsQuery {
            status: Some("SOLD".into()),
            ..Default::default()
        };
        let err = list_mine(&state, &Identity::from(&buyer), query)
            .await
            .unwrap_err();
        assert_eq!(fields(err), vec!["status".to_string()]);
    }

    #[tokio::test]
    async fn view_resolves_participants() {
        let state = fake_state();
        let (seller, buyer) = parties(&state).await;
        let room = open_room(&state, &seller, &buyer).await;
        let view = view(&state, &room).await.unwrap();
        assert_eq!(view.creator.unwrap().username, "seller");
        assert_eq!(view.buyer.unwrap().username, "buyer");
        assert_eq!(view.total_cents, 20_700);
    }
}
