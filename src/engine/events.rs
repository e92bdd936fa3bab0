//! Event Broadcaster
//!
//! Fans out auction state changes to room subscribers over per-room
//! broadcast channels, and hands winner-determination results to the
//! downstream fulfillment workflow over a bounded queue. Publishing is
//! fire-and-forget in both directions: a room with no listeners drops the
//! event, and a saturated workflow queue is logged, never propagated back
//! into the bidder-facing transaction.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::Bid;

/// Server -> client events, tagged by `event` on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum AuctionEvent {
    #[serde(rename = "auction:started", rename_all = "camelCase")]
    Started {
        auction_id: Uuid,
        deal_room_id: String,
        start_price: Decimal,
        min_increment: Decimal,
        end_at: DateTime<Utc>,
    },
    #[serde(rename = "auction:bid:update", rename_all = "camelCase")]
    BidUpdate {
        auction_id: Uuid,
        bid: Bid,
        /// Always the admitted bid itself; kept separate because clients
        /// track the leader from this field
        highest_bid: Bid,
        bidder_id: String,
    },
    #[serde(rename = "auction:closed", rename_all = "camelCase")]
    Closed {
        auction_id: Uuid,
        deal_room_id: String,
        winner_id: Option<String>,
        final_amount: Option<Decimal>,
        has_winner: bool,
    },
    /// Delivered only to the offending caller, never broadcast
    #[serde(rename = "auction:error", rename_all = "camelCase")]
    Error { error: String },
}

impl AuctionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuctionEvent::Started { .. } => "auction:started",
            AuctionEvent::BidUpdate { .. } => "auction:bid:update",
            AuctionEvent::Closed { .. } => "auction:closed",
            AuctionEvent::Error { .. } => "auction:error",
        }
    }
}

/// Downstream workflow event emitted on close-with-winner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub deal_room_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: Decimal,
    pub auction_id: Uuid,
}

pub struct EventBroadcaster {
    rooms: DashMap<String, broadcast::Sender<AuctionEvent>>,
    event_buffer: usize,
    workflow_tx: mpsc::Sender<OrderCreated>,
}

impl EventBroadcaster {
    /// Returns the broadcaster and the receiving end of the workflow queue;
    /// the embedder wires the receiver to the fulfillment system.
    pub fn new(event_buffer: usize, workflow_queue: usize) -> (Self, mpsc::Receiver<OrderCreated>) {
        let (workflow_tx, workflow_rx) = mpsc::channel(workflow_queue);
        (
            Self {
                rooms: DashMap::new(),
                event_buffer,
                workflow_tx,
            },
            workflow_rx,
        )
    }

    /// Subscribe to a deal room's event stream. The channel is created on
    /// first use, so participants can join before any auction starts.
    pub fn subscribe(&self, deal_room_id: &str) -> broadcast::Receiver<AuctionEvent> {
        self.room_channel(deal_room_id).subscribe()
    }

    /// Fan an event out to the room's subscribers
    pub fn publish(&self, deal_room_id: &str, event: AuctionEvent) {
        let kind = event.kind();
        match self.room_channel(deal_room_id).send(event) {
            Ok(receivers) => {
                debug!(room = %deal_room_id, kind, receivers, "event published");
            }
            Err(_) => {
                // No subscriber in the room yet; the event carries no
                // obligation beyond best-effort delivery
                debug!(room = %deal_room_id, kind, "event dropped, no subscribers");
            }
        }
    }

    /// Enqueue the downstream order; fire-and-forget
    pub fn emit_order_created(&self, order: OrderCreated) {
        if let Err(e) = self.workflow_tx.try_send(order) {
            warn!(error = %e, "failed to enqueue order.created for fulfillment");
        }
    }

    pub fn room_subscribers(&self, deal_room_id: &str) -> usize {
        self.rooms
            .get(deal_room_id)
            .map(|entry| entry.receiver_count())
            .unwrap_or(0)
    }

    fn room_channel(&self, deal_room_id: &str) -> broadcast::Sender<AuctionEvent> {
        self.rooms
            .entry(deal_room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.event_buffer).0)
            .clone()
    }
}
