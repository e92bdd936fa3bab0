use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::engine::AuctionEngine;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// The engine behind every auction operation
    pub engine: Arc<AuctionEngine>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<AuctionEngine>) -> Self {
        Self {
            engine,
            start_time: Utc::now(),
        }
    }

    /// Process uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
