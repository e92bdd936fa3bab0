//! Auction Record Store
//!
//! Durable representation of an auction's identity, configuration, and
//! current state. The engine is the only writer; all mutation happens
//! under the engine's per-auction guard, so implementations only need
//! point reads/writes plus the two scan queries.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::Auction;
use crate::error::{AuctionError, AuctionResult};

#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Insert a newly created auction
    async fn create(&self, auction: &Auction) -> AuctionResult<()>;

    /// Fetch by id; `AuctionNotFound` if unknown
    async fn get(&self, id: Uuid) -> AuctionResult<Auction>;

    /// Replace the stored record; `AuctionNotFound` if unknown
    async fn update(&self, auction: &Auction) -> AuctionResult<()>;

    /// The room's live (`pending`/`active`) auction, if any.
    /// At most one exists per room; the engine enforces that at creation.
    async fn find_live_by_room(&self, deal_room_id: &str) -> AuctionResult<Option<Auction>>;

    /// All live auctions; recovery sweep input
    async fn list_live(&self) -> AuctionResult<Vec<Auction>>;
}

/// In-memory store backing tests and the dev server
#[derive(Debug, Default)]
pub struct MemoryAuctionStore {
    auctions: DashMap<Uuid, Auction>,
}

impl MemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.auctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auctions.is_empty()
    }
}

#[async_trait]
impl AuctionStore for MemoryAuctionStore {
    async fn create(&self, auction: &Auction) -> AuctionResult<()> {
        self.auctions.insert(auction.id, auction.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AuctionResult<Auction> {
        self.auctions
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(AuctionError::AuctionNotFound { id: id.to_string() })
    }

    async fn update(&self, auction: &Auction) -> AuctionResult<()> {
        match self.auctions.get_mut(&auction.id) {
            Some(mut entry) => {
                *entry = auction.clone();
                Ok(())
            }
            None => Err(AuctionError::AuctionNotFound {
                id: auction.id.to_string(),
            }),
        }
    }

    async fn find_live_by_room(&self, deal_room_id: &str) -> AuctionResult<Option<Auction>> {
        Ok(self
            .auctions
            .iter()
            .find(|entry| entry.deal_room_id == deal_room_id && entry.state.is_live())
            .map(|entry| entry.clone()))
    }

    async fn list_live(&self) -> AuctionResult<Vec<Auction>> {
        Ok(self
            .auctions
            .iter()
            .filter(|entry| entry.state.is_live())
            .map(|entry| entry.clone())
            .collect())
    }
}
