use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single admitted bid. Immutable once created; the ledger is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    pub fn new(auction_id: Uuid, bidder_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            auction_id,
            bidder_id: bidder_id.into(),
            amount,
            created_at: Utc::now(),
        }
    }
}
