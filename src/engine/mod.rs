//! Auction engine core: admission rules, the operation surface, the
//! deadline scheduler, and event fan-out.

pub mod admission;
pub mod engine;
pub mod events;
pub mod scheduler;

pub use engine::{AuctionEngine, EngineRuntime, RecoveryReport};
pub use events::{AuctionEvent, EventBroadcaster, OrderCreated};
pub use scheduler::{AuctionScheduler, Deadline, DeadlineKind, SchedulerHandle};
