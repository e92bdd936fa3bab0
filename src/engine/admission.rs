//! Bid Admission Controller
//!
//! Pure validation for incoming bids. Existence is the caller's concern
//! (the record was already loaded); everything else is checked here in a
//! fixed fail-fast order: state, amount sanity, eligibility, minimum.
//! Callers must hold the auction's guard so `highest_bid` cannot go stale
//! between this check and the ledger append.

use rust_decimal::Decimal;

use crate::domain::Auction;
use crate::error::{AuctionError, AuctionResult};

/// Validate a bid against the auction's current state.
///
/// First violation wins; on success the bid may be appended and installed
/// as the new highest without re-checking.
pub fn admit_bid(auction: &Auction, caller_id: &str, amount: Decimal) -> AuctionResult<()> {
    if !auction.state.accepts_bids() {
        return Err(AuctionError::AuctionNotActive {
            state: auction.state.to_string(),
        });
    }

    if amount <= Decimal::ZERO {
        return Err(AuctionError::InvalidAmount(
            "bid amount must be positive".to_string(),
        ));
    }

    // The seller never bids on their own auction, invited or not
    if auction.is_seller(caller_id) || !auction.is_invited(caller_id) {
        return Err(AuctionError::NotInvited);
    }

    let minimum = auction.minimum_acceptable_bid();
    if amount < minimum {
        return Err(AuctionError::bid_too_low(minimum));
    }

    Ok(())
}
