use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use gavel::api::{create_router, AppState};
use gavel::config::EngineConfig;
use gavel::engine::{EngineRuntime, OrderCreated};
use gavel::store::{
    AuctionStore, BidLedger, DealRoom, DealRoomRepository, MemoryAuctionStore, MemoryBidLedger,
    MemoryDealRooms,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

struct TestContext {
    app: Router,
    _runtime: EngineRuntime,
    _workflow_rx: mpsc::Receiver<OrderCreated>,
}

impl TestContext {
    fn new() -> Self {
        let store: Arc<dyn AuctionStore> = Arc::new(MemoryAuctionStore::new());
        let ledger: Arc<dyn BidLedger> = Arc::new(MemoryBidLedger::new());
        let rooms = MemoryDealRooms::new();
        rooms.insert(DealRoom {
            id: "room-1".to_string(),
            listing_id: "listing-1".to_string(),
            seller_id: "seller-1".to_string(),
        });
        let rooms: Arc<dyn DealRoomRepository> = Arc::new(rooms);

        let (runtime, workflow_rx) =
            EngineRuntime::start(store, ledger, rooms, &EngineConfig::default());
        let state = AppState::new(runtime.engine());
        let app = create_router(state);

        Self {
            app,
            _runtime: runtime,
            _workflow_rx: workflow_rx,
        }
    }
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, String) {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (key, value) in headers {
        request_builder = request_builder.header(*key, *value);
    }

    let request = if let Some(payload) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("failed to build json request")
    } else {
        request_builder
            .body(Body::empty())
            .expect("failed to build empty request")
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let body = String::from_utf8_lossy(&bytes).to_string();

    (status, body)
}

fn auction_request() -> Value {
    json!({
        "startPrice": "10000",
        "minIncrement": "500",
        "durationMinutes": 30,
        "inviteeIds": ["alice", "bob"]
    })
}

/// Start an auction in room-1 as seller-1 and return the created auction
async fn start_default_auction(app: &Router) -> Value {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(auction_request()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected response: {body}");
    serde_json::from_str(&body).expect("invalid auction json")
}

#[tokio::test]
async fn start_auction_creates_active_auction() {
    let ctx = TestContext::new();

    let auction = start_default_auction(&ctx.app).await;

    assert!(auction["id"].is_string());
    assert_eq!(auction["state"], "active");
    assert_eq!(auction["dealRoomId"], "room-1");
    assert_eq!(auction["listingId"], "listing-1");
    assert_eq!(auction["sellerId"], "seller-1");
    assert_eq!(auction["startPrice"], "10000");
    assert_eq!(auction["minIncrement"], "500");
    assert!(auction["highestBid"].is_null());
    assert!(auction["endAt"].is_string());
}

#[tokio::test]
async fn start_auction_requires_caller_header() {
    let ctx = TestContext::new();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[],
        Some(auction_request()),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    let error: Value = serde_json::from_str(&body).expect("invalid error json");
    assert!(
        error["error"].as_str().unwrap_or("").contains("x-caller-id"),
        "expected caller header error, got: {body}"
    );
}

#[tokio::test]
async fn start_auction_rejects_non_seller() {
    let ctx = TestContext::new();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "mallory")],
        Some(auction_request()),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert!(
        body.contains("only the seller"),
        "expected seller-only error, got: {body}"
    );
}

#[tokio::test]
async fn start_auction_rejects_unknown_room() {
    let ctx = TestContext::new();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-404/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(auction_request()),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert!(
        body.contains("deal room not found"),
        "expected room error, got: {body}"
    );
}

#[tokio::test]
async fn start_auction_lists_missing_fields() {
    let ctx = TestContext::new();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(json!({ "durationMinutes": 30 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(
        body.contains("startPrice") && body.contains("inviteeIds"),
        "expected missing-field listing, got: {body}"
    );
}

#[tokio::test]
async fn one_live_auction_per_room() {
    let ctx = TestContext::new();

    start_default_auction(&ctx.app).await;

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(auction_request()),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(
        body.contains("already has a live auction"),
        "expected conflict error, got: {body}"
    );
}

#[tokio::test]
async fn bid_flow_enforces_minimum() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    // First bid must meet the start price
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "alice")],
        Some(json!({ "amount": "10000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let bid: Value = serde_json::from_str(&body).expect("invalid bid json");
    assert_eq!(bid["bidderId"], "alice");
    assert_eq!(bid["amount"], "10000");

    // Next bid below highest + increment is rejected with the minimum
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "bob")],
        Some(json!({ "amount": "10200" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(
        body.contains("10500"),
        "expected minimum in rejection, got: {body}"
    );

    // Meeting the minimum is admitted
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "bob")],
        Some(json!({ "amount": "10500" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    // The ledger lists both bids in order
    let (status, body) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/auctions/{auction_id}/bids"),
        &[("x-caller-id", "seller-1")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let listing: Value = serde_json::from_str(&body).expect("invalid bids json");
    assert_eq!(listing["total"], 2);
    assert_eq!(listing["bids"][0]["amount"], "10000");
    assert_eq!(listing["bids"][1]["amount"], "10500");
}

#[tokio::test]
async fn bid_rejected_for_uninvited_callers() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "mallory")],
        Some(json!({ "amount": "10000" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert!(
        body.contains("not invited"),
        "expected invitation error, got: {body}"
    );

    // The seller watches, never bids
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "seller-1")],
        Some(json!({ "amount": "10000" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn bid_requires_amount() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "alice")],
        Some(json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(
        body.contains("amount"),
        "expected amount error, got: {body}"
    );
}

#[tokio::test]
async fn undecodable_body_returns_error_envelope() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    // Truncated JSON never reaches the handler; the rejection still
    // wears the flat envelope
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/auctions/{auction_id}/bid"))
        .header("x-caller-id", "alice")
        .header("content-type", "application/json")
        .body(Body::from("{\"amount\": "))
        .expect("failed to build request");
    let response = ctx
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let error: Value = serde_json::from_slice(&bytes).expect("rejection is not flat error json");
    assert!(error["error"].is_string(), "missing error field: {error}");

    // A body without the json content type keeps its own status
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/auctions/{auction_id}/bid"))
        .header("x-caller-id", "alice")
        .body(Body::from("{\"amount\": \"10000\"}"))
        .expect("failed to build request");
    let response = ctx
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let error: Value = serde_json::from_slice(&bytes).expect("rejection is not flat error json");
    assert!(error["error"].is_string(), "missing error field: {error}");
}

#[tokio::test]
async fn start_auction_rejects_oversized_duration() {
    let ctx = TestContext::new();

    let mut request = auction_request();
    request["durationMinutes"] = json!(200_000_000_000_i64);

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(request),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(
        body.contains("duration"),
        "expected duration error, got: {body}"
    );
}

#[tokio::test]
async fn auction_view_is_participant_only() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    let (status, body) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/auctions/{auction_id}"),
        &[("x-caller-id", "alice")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let view: Value = serde_json::from_str(&body).expect("invalid view json");
    let remaining = view["remainingSeconds"].as_i64().expect("no countdown");
    assert!(
        remaining > 1700 && remaining <= 1800,
        "unexpected countdown: {remaining}"
    );

    let (status, body) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/auctions/{auction_id}"),
        &[("x-caller-id", "mallory")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn unknown_and_malformed_auction_ids_are_not_found() {
    let ctx = TestContext::new();

    let (status, body) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/auctions/{}", uuid::Uuid::new_v4()),
        &[("x-caller-id", "alice")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::GET,
        "/auctions/not-a-uuid",
        &[("x-caller-id", "alice")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}

#[tokio::test]
async fn cancel_ends_auction_and_blocks_bids() {
    let ctx = TestContext::new();
    let auction = start_default_auction(&ctx.app).await;
    let auction_id = auction["id"].as_str().unwrap();

    // A standing bid does not protect the auction from cancellation
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "alice")],
        Some(json!({ "amount": "10000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/cancel"),
        &[("x-caller-id", "alice")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/cancel"),
        &[("x-caller-id", "seller-1")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let cancelled: Value = serde_json::from_str(&body).expect("invalid auction json");
    assert_eq!(cancelled["state"], "cancelled");

    // Terminal state: no second cancel, no further bids
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/cancel"),
        &[("x-caller-id", "seller-1")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "bob")],
        Some(json!({ "amount": "11000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(
        body.contains("not active"),
        "expected inactive error, got: {body}"
    );
}

#[tokio::test]
async fn scheduled_auction_starts_pending() {
    let ctx = TestContext::new();

    let open_at = (chrono::Utc::now() + chrono::Duration::minutes(10)).to_rfc3339();
    let mut request = auction_request();
    request["openAt"] = json!(open_at);

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/deals/room-1/start-auction",
        &[("x-caller-id", "seller-1")],
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let auction: Value = serde_json::from_str(&body).expect("invalid auction json");
    assert_eq!(auction["state"], "pending");
    let auction_id = auction["id"].as_str().unwrap();

    // Pending auctions do not admit bids yet
    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/auctions/{auction_id}/bid"),
        &[("x-caller-id", "alice")],
        Some(json!({ "amount": "10000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(
        body.contains("pending"),
        "expected pending-state error, got: {body}"
    );
}

#[tokio::test]
async fn healthz_reports_ok() {
    let ctx = TestContext::new();

    let (status, body) = send_json(&ctx.app, Method::GET, "/healthz", &[], None).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let health: Value = serde_json::from_str(&body).expect("invalid health json");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["uptimeSeconds"].is_i64());
}
