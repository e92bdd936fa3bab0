use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bid::Bid;
use super::state::AuctionState;

/// Creation parameters for a new auction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionParams {
    pub start_price: Decimal,
    pub min_increment: Decimal,
    pub duration_minutes: i64,
    pub invitee_ids: Vec<String>,
}

/// An auction attached to a deal room.
///
/// Created on start-auction; mutated only through the engine (bid admission
/// updates `highest_bid`, close/cancel update `state`); never deleted, only
/// transitioned to a terminal state for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: Uuid,
    pub deal_room_id: String,
    pub listing_id: String,
    pub seller_id: String,
    pub start_price: Decimal,
    pub min_increment: Decimal,
    pub state: AuctionState,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub invitee_ids: Vec<String>,
    /// Most recent admitted bid; None until the first bid
    pub highest_bid: Option<Bid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    /// Create an auction that starts accepting bids immediately.
    /// `end_at = now + duration_minutes`, fixed for the auction's lifetime.
    pub fn open(
        deal_room_id: impl Into<String>,
        listing_id: impl Into<String>,
        seller_id: impl Into<String>,
        params: AuctionParams,
    ) -> Self {
        let now = Utc::now();
        Self::build(deal_room_id, listing_id, seller_id, params, now, AuctionState::Active)
    }

    /// Create an auction with a deferred start: `pending` until `open_at`,
    /// bidding window still `duration_minutes` long from `open_at`.
    pub fn deferred(
        deal_room_id: impl Into<String>,
        listing_id: impl Into<String>,
        seller_id: impl Into<String>,
        params: AuctionParams,
        open_at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            deal_room_id,
            listing_id,
            seller_id,
            params,
            open_at,
            AuctionState::Pending,
        )
    }

    fn build(
        deal_room_id: impl Into<String>,
        listing_id: impl Into<String>,
        seller_id: impl Into<String>,
        params: AuctionParams,
        start_at: DateTime<Utc>,
        state: AuctionState,
    ) -> Self {
        let now = Utc::now();
        // A window too large for the calendar clamps to its far end
        // instead of panicking on the timestamp arithmetic
        let end_at = Duration::try_minutes(params.duration_minutes)
            .and_then(|window| start_at.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: Uuid::new_v4(),
            deal_room_id: deal_room_id.into(),
            listing_id: listing_id.into(),
            seller_id: seller_id.into(),
            start_price: params.start_price,
            min_increment: params.min_increment,
            state,
            start_at,
            end_at,
            invitee_ids: params.invitee_ids,
            highest_bid: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The smallest amount the next bid must reach: `start_price` before the
    /// first bid, `highest + min_increment` afterwards.
    pub fn minimum_acceptable_bid(&self) -> Decimal {
        match &self.highest_bid {
            Some(highest) => highest.amount + self.min_increment,
            None => self.start_price,
        }
    }

    /// Whole seconds until `end_at`, clamped at zero
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.end_at - now).num_seconds().max(0)
    }

    pub fn is_invited(&self, caller_id: &str) -> bool {
        self.invitee_ids.iter().any(|id| id == caller_id)
    }

    pub fn is_seller(&self, caller_id: &str) -> bool {
        self.seller_id == caller_id
    }

    /// Seller or invitee; the audience allowed to view the auction
    pub fn is_participant(&self, caller_id: &str) -> bool {
        self.is_seller(caller_id) || self.is_invited(caller_id)
    }

    pub fn has_winner(&self) -> bool {
        self.state == AuctionState::Closed && self.highest_bid.is_some()
    }

    /// Read projection with the computed countdown
    pub fn view_at(&self, now: DateTime<Utc>) -> AuctionView {
        AuctionView {
            auction: self.clone(),
            remaining_seconds: self.remaining_seconds(now),
        }
    }
}

/// Full auction view plus the computed `remainingSeconds`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionView {
    #[serde(flatten)]
    pub auction: Auction,
    pub remaining_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_params() -> AuctionParams {
        AuctionParams {
            start_price: dec!(10000),
            min_increment: dec!(500),
            duration_minutes: 30,
            invitee_ids: vec!["alice".to_string(), "bob".to_string()],
        }
    }

    #[test]
    fn test_open_auction_is_active_with_fixed_window() {
        let auction = Auction::open("room-1", "listing-1", "seller-1", make_params());

        assert_eq!(auction.state, AuctionState::Active);
        assert_eq!(auction.end_at - auction.start_at, Duration::minutes(30));
    }

    #[test]
    fn test_deferred_auction_is_pending() {
        let open_at = Utc::now() + Duration::minutes(5);
        let auction = Auction::deferred("room-1", "listing-1", "seller-1", make_params(), open_at);

        assert_eq!(auction.state, AuctionState::Pending);
        assert_eq!(auction.start_at, open_at);
        assert_eq!(auction.end_at, open_at + Duration::minutes(30));
    }

    #[test]
    fn test_oversized_window_clamps_end_at() {
        // Past chrono's calendar range but within TimeDelta
        let mut params = make_params();
        params.duration_minutes = 200_000_000_000;
        let auction = Auction::open("room-1", "listing-1", "seller-1", params);
        assert_eq!(auction.end_at, DateTime::<Utc>::MAX_UTC);

        // Past TimeDelta's own range
        let mut params = make_params();
        params.duration_minutes = i64::MAX;
        let auction = Auction::open("room-1", "listing-1", "seller-1", params);
        assert_eq!(auction.end_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(auction.remaining_seconds(auction.end_at), 0);
    }

    #[test]
    fn test_minimum_acceptable_bid() {
        let mut auction = Auction::open("room-1", "listing-1", "seller-1", make_params());
        assert_eq!(auction.minimum_acceptable_bid(), dec!(10000));

        auction.highest_bid = Some(Bid::new(auction.id, "alice", dec!(12500)));
        assert_eq!(auction.minimum_acceptable_bid(), dec!(13000));
    }

    #[test]
    fn test_remaining_seconds_clamps_at_zero() {
        let auction = Auction::open("room-1", "listing-1", "seller-1", make_params());

        assert!(auction.remaining_seconds(Utc::now()) <= 30 * 60);
        assert_eq!(auction.remaining_seconds(auction.end_at + Duration::hours(1)), 0);
    }

    #[test]
    fn test_participant_checks() {
        let auction = Auction::open("room-1", "listing-1", "seller-1", make_params());

        assert!(auction.is_invited("alice"));
        assert!(!auction.is_invited("seller-1"));
        assert!(auction.is_participant("seller-1"));
        assert!(auction.is_participant("bob"));
        assert!(!auction.is_participant("mallory"));
    }

    #[test]
    fn test_view_serializes_flat_camel_case() {
        let auction = Auction::open("room-1", "listing-1", "seller-1", make_params());
        let view = auction.view_at(Utc::now());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["dealRoomId"], "room-1");
        assert!(json["remainingSeconds"].is_i64());
        assert!(json.get("auction").is_none());
    }
}
