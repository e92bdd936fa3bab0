pub mod auctions;
pub mod ledger;
pub mod rooms;

pub use auctions::{AuctionStore, MemoryAuctionStore};
pub use ledger::{BidLedger, MemoryBidLedger};
pub use rooms::{DealRoom, DealRoomRepository, MemoryDealRooms};
