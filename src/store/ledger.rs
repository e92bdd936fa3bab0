//! Bid Ledger
//!
//! Append-only ordered record of bids, keyed by auction. Appends never
//! overwrite; reads are safe under concurrent appends because admission is
//! serialized per auction upstream. `highest_for` recomputes from the
//! ledger itself so it stays correct even if the cached copy on the
//! auction record were lost.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::Bid;
use crate::error::AuctionResult;

#[async_trait]
pub trait BidLedger: Send + Sync {
    /// Append a bid; returns the stored record
    async fn append(&self, bid: Bid) -> AuctionResult<Bid>;

    /// Current highest bid. Ties in amount are broken by earliest
    /// `created_at`: the first bid at a given amount keeps priority.
    async fn highest_for(&self, auction_id: Uuid) -> AuctionResult<Option<Bid>>;

    /// All bids for an auction, ascending by `created_at`
    async fn list_for(&self, auction_id: Uuid) -> AuctionResult<Vec<Bid>>;

    /// Number of appended bids for an auction
    async fn count_for(&self, auction_id: Uuid) -> AuctionResult<usize>;
}

/// In-memory ledger backing tests and the dev server
#[derive(Debug, Default)]
pub struct MemoryBidLedger {
    bids: DashMap<Uuid, Vec<Bid>>,
}

impl MemoryBidLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BidLedger for MemoryBidLedger {
    async fn append(&self, bid: Bid) -> AuctionResult<Bid> {
        self.bids
            .entry(bid.auction_id)
            .or_default()
            .push(bid.clone());
        Ok(bid)
    }

    async fn highest_for(&self, auction_id: Uuid) -> AuctionResult<Option<Bid>> {
        let Some(entry) = self.bids.get(&auction_id) else {
            return Ok(None);
        };

        let mut best: Option<&Bid> = None;
        for bid in entry.iter() {
            let beats = match best {
                None => true,
                Some(current) => {
                    bid.amount > current.amount
                        || (bid.amount == current.amount && bid.created_at < current.created_at)
                }
            };
            if beats {
                best = Some(bid);
            }
        }

        Ok(best.cloned())
    }

    async fn list_for(&self, auction_id: Uuid) -> AuctionResult<Vec<Bid>> {
        let mut bids = self
            .bids
            .get(&auction_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        bids.sort_by_key(|bid| bid.created_at);
        Ok(bids)
    }

    async fn count_for(&self, auction_id: Uuid) -> AuctionResult<usize> {
        Ok(self.bids.get(&auction_id).map(|entry| entry.len()).unwrap_or(0))
    }
}
