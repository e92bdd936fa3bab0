use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::api::auth::require_caller;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ApiJson, BidRequest, BidsListResponse, StartAuctionRequest};
use crate::domain::{Auction, AuctionView, Bid};
use crate::error::AuctionError;

/// A malformed id cannot name any auction
fn parse_auction_id(raw: &str) -> std::result::Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::Auction(AuctionError::AuctionNotFound {
            id: raw.to_string(),
        })
    })
}

/// POST /deals/:deal_room_id/start-auction
///
/// Seller-only. Creates the auction (immediately `active`, or `pending`
/// when `openAt` is supplied) and broadcasts `auction:started` to the room.
pub async fn start_auction(
    State(state): State<AppState>,
    Path(deal_room_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<StartAuctionRequest>,
) -> std::result::Result<(StatusCode, Json<Auction>), ApiError> {
    let caller = require_caller(&headers)?;
    let (params, open_at) = body.into_params()?;

    let auction = match open_at {
        Some(at) => {
            state
                .engine
                .schedule_auction(&deal_room_id, &caller, params, at)
                .await?
        }
        None => {
            state
                .engine
                .start_auction(&deal_room_id, &caller, params)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(auction)))
}

/// POST /auctions/:auction_id/bid
pub async fn place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<BidRequest>,
) -> std::result::Result<(StatusCode, Json<Bid>), ApiError> {
    let caller = require_caller(&headers)?;
    let auction_id = parse_auction_id(&auction_id)?;
    let amount = body.amount()?;

    let bid = state.engine.place_bid(auction_id, &caller, amount).await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// GET /auctions/:auction_id
///
/// Participant-only view including the `remainingSeconds` countdown.
pub async fn get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<AuctionView>, ApiError> {
    let caller = require_caller(&headers)?;
    let auction_id = parse_auction_id(&auction_id)?;

    let view = state.engine.auction_view(auction_id, &caller).await?;
    Ok(Json(view))
}

/// GET /auctions/:auction_id/bids
pub async fn list_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<BidsListResponse>, ApiError> {
    let caller = require_caller(&headers)?;
    let auction_id = parse_auction_id(&auction_id)?;

    let bids = state.engine.list_bids(auction_id, &caller).await?;
    let total = bids.len();
    Ok(Json(BidsListResponse { bids, total }))
}

/// POST /auctions/:auction_id/cancel
pub async fn cancel_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<Auction>, ApiError> {
    let caller = require_caller(&headers)?;
    let auction_id = parse_auction_id(&auction_id)?;

    let auction = state.engine.cancel_auction(auction_id, &caller).await?;
    Ok(Json(auction))
}
