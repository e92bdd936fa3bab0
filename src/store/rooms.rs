//! Deal-room repository boundary.
//!
//! Deal rooms, listings, and users live in the marketplace backend; the
//! engine only needs to resolve a room id to its listing and seller. The
//! in-memory implementation is seeded from config for the dev server and
//! built directly in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::RoomSeed;
use crate::error::AuctionResult;

/// The slice of a deal room the engine needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRoom {
    pub id: String,
    pub listing_id: String,
    pub seller_id: String,
}

#[async_trait]
pub trait DealRoomRepository: Send + Sync {
    async fn get(&self, deal_room_id: &str) -> AuctionResult<Option<DealRoom>>;
}

/// In-memory repository backing tests and the dev server
#[derive(Debug, Default)]
pub struct MemoryDealRooms {
    rooms: DashMap<String, DealRoom>,
}

impl MemoryDealRooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seeds: &[RoomSeed]) -> Self {
        let repo = Self::new();
        for seed in seeds {
            repo.insert(DealRoom::from(seed));
        }
        repo
    }

    pub fn insert(&self, room: DealRoom) {
        self.rooms.insert(room.id.clone(), room);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl From<&RoomSeed> for DealRoom {
    fn from(seed: &RoomSeed) -> Self {
        Self {
            id: seed.id.clone(),
            listing_id: seed.listing_id.clone(),
            seller_id: seed.seller_id.clone(),
        }
    }
}

#[async_trait]
impl DealRoomRepository for MemoryDealRooms {
    async fn get(&self, deal_room_id: &str) -> AuctionResult<Option<DealRoom>> {
        Ok(self.rooms.get(deal_room_id).map(|entry| entry.clone()))
    }
}
