pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod store;

pub use config::AppConfig;
pub use domain::{Auction, AuctionParams, AuctionState, AuctionView, Bid, CloseTrigger};
pub use engine::{AuctionEngine, AuctionEvent, EngineRuntime, OrderCreated, RecoveryReport};
pub use error::{AuctionError, AuctionResult, GavelError, Result};
pub use store::{
    AuctionStore, BidLedger, DealRoom, DealRoomRepository, MemoryAuctionStore, MemoryBidLedger,
    MemoryDealRooms,
};
