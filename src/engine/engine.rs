//! The auction engine: one operation surface behind every transport.
//!
//! HTTP handlers and the socket channel decode input, call an operation
//! here, and encode the outcome; nothing in this module knows about wire
//! formats. Per-auction ordering is enforced with an arena of async
//! mutexes keyed by auction id (plus one per room for creation), so bid
//! admission, close, and cancel for one auction never interleave, while
//! unrelated auctions proceed independently. Arena slots exist only for
//! auctions that exist and are released once an auction is terminal, so
//! the arena tracks live auctions rather than request traffic.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{
    Auction, AuctionParams, AuctionState, AuctionTransition, AuctionView, Bid, CloseTrigger,
};
use crate::error::{AuctionError, AuctionResult};
use crate::store::{AuctionStore, BidLedger, DealRoomRepository};

use super::admission;
use super::events::{AuctionEvent, EventBroadcaster, OrderCreated};
use super::scheduler::{AuctionScheduler, Deadline, DeadlineKind, SchedulerHandle};

/// Counts from the startup recovery sweep
#[derive(Debug, Default, Clone, Serialize)]
pub struct RecoveryReport {
    pub activated: usize,
    pub closed_overdue: usize,
    pub rescheduled: usize,
}

pub struct AuctionEngine {
    store: Arc<dyn AuctionStore>,
    ledger: Arc<dyn BidLedger>,
    rooms: Arc<dyn DealRoomRepository>,
    broadcaster: Arc<EventBroadcaster>,
    scheduler: SchedulerHandle,
    auction_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    room_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AuctionEngine {
    /// Start an auction that accepts bids immediately.
    ///
    /// Caller must be the room's seller. Creates the record in `active`
    /// state with `end_at = now + duration_minutes`, schedules the close,
    /// and broadcasts `auction:started` to the room.
    pub async fn start_auction(
        &self,
        deal_room_id: &str,
        caller_id: &str,
        params: AuctionParams,
    ) -> AuctionResult<Auction> {
        self.create_auction(deal_room_id, caller_id, params, None)
            .await
    }

    /// Deferred-start variant: the auction sits in `pending` until
    /// `open_at`, when the scheduler activates it and bidding opens.
    /// An `open_at` in the past degrades to an immediate start.
    pub async fn schedule_auction(
        &self,
        deal_room_id: &str,
        caller_id: &str,
        params: AuctionParams,
        open_at: DateTime<Utc>,
    ) -> AuctionResult<Auction> {
        self.create_auction(deal_room_id, caller_id, params, Some(open_at))
            .await
    }

    async fn create_auction(
        &self,
        deal_room_id: &str,
        caller_id: &str,
        mut params: AuctionParams,
        open_at: Option<DateTime<Utc>>,
    ) -> AuctionResult<Auction> {
        let room = self
            .rooms
            .get(deal_room_id)
            .await?
            .ok_or_else(|| AuctionError::RoomNotFound {
                deal_room_id: deal_room_id.to_string(),
            })?;

        if room.seller_id != caller_id {
            return Err(AuctionError::NotSeller);
        }

        validate_params(&params)?;
        dedupe_invitees(&mut params.invitee_ids);

        // One live auction per room: check-and-create under the room guard
        let guard = self.room_guard(deal_room_id);
        let room_lock = guard.lock().await;

        if let Some(existing) = self.store.find_live_by_room(deal_room_id).await? {
            return Err(AuctionError::InvalidState(format!(
                "deal room {} already has a live auction ({})",
                deal_room_id, existing.id
            )));
        }

        let auction = match open_at {
            Some(at) if at > Utc::now() => {
                Auction::deferred(room.id, room.listing_id, room.seller_id, params, at)
            }
            _ => Auction::open(room.id, room.listing_id, room.seller_id, params),
        };
        self.store.create(&auction).await?;
        drop(room_lock);

        if auction.state == AuctionState::Pending {
            if let Err(e) = self.scheduler.schedule_open(auction.id, auction.start_at).await {
                warn!(auction_id = %auction.id, error = %e, "failed to schedule activation");
            }
        }
        if let Err(e) = self.scheduler.schedule_close(auction.id, auction.end_at).await {
            warn!(auction_id = %auction.id, error = %e, "failed to schedule close");
        }

        if auction.state == AuctionState::Active {
            self.broadcast_started(&auction);
        }

        info!(
            auction_id = %auction.id,
            room = %auction.deal_room_id,
            seller = %auction.seller_id,
            state = %auction.state,
            end_at = %auction.end_at,
            "auction created"
        );
        Ok(auction)
    }

    /// `pending -> active`. Idempotent: activating an already-active
    /// auction is a no-op, so duplicate scheduler fires are harmless.
    pub async fn activate_auction(&self, auction_id: Uuid) -> AuctionResult<Auction> {
        self.store.get(auction_id).await?;
        let guard = self.auction_guard(auction_id);
        let lock = guard.lock().await;

        let mut auction = self.store.get(auction_id).await?;
        match auction.state {
            AuctionState::Active => return Ok(auction),
            AuctionState::Pending => {}
            other => {
                drop(lock);
                self.release_auction_guard(auction_id);
                return Err(AuctionError::InvalidState(format!(
                    "cannot activate auction in state {other}"
                )));
            }
        }

        let transition =
            AuctionTransition::new(auction.state, AuctionState::Active, "start time reached");
        auction.state = AuctionState::Active;
        auction.updated_at = Utc::now();
        self.store.update(&auction).await?;
        drop(lock);

        debug!(
            auction_id = %auction.id,
            from = %transition.from,
            to = %transition.to,
            "state transition"
        );
        self.broadcast_started(&auction);
        info!(auction_id = %auction.id, room = %auction.deal_room_id, "auction activated");
        Ok(auction)
    }

    /// Admit a bid. Validation, ledger append, and highest-bid update run
    /// as one unit under the auction's guard; the event goes out after the
    /// mutation commits.
    pub async fn place_bid(
        &self,
        auction_id: Uuid,
        caller_id: &str,
        amount: Decimal,
    ) -> AuctionResult<Bid> {
        // Existence first, so unknown ids never enter the guard arena
        self.store.get(auction_id).await?;
        let guard = self.auction_guard(auction_id);
        let lock = guard.lock().await;

        let mut auction = self.store.get(auction_id).await?;
        if let Err(err) = admission::admit_bid(&auction, caller_id, amount) {
            let terminal = auction.state.is_terminal();
            drop(lock);
            if terminal {
                self.release_auction_guard(auction_id);
            }
            return Err(err);
        }

        let bid = self
            .ledger
            .append(Bid::new(auction_id, caller_id, amount))
            .await?;
        auction.highest_bid = Some(bid.clone());
        auction.updated_at = Utc::now();
        self.store.update(&auction).await?;
        drop(lock);

        self.broadcaster.publish(
            &auction.deal_room_id,
            AuctionEvent::BidUpdate {
                auction_id,
                bid: bid.clone(),
                highest_bid: bid.clone(),
                bidder_id: bid.bidder_id.clone(),
            },
        );
        info!(
            auction_id = %auction_id,
            bidder = %bid.bidder_id,
            amount = %bid.amount,
            "bid admitted"
        );
        Ok(bid)
    }

    /// Full auction view with the remaining-seconds countdown.
    /// Restricted to the seller and invitees.
    pub async fn auction_view(&self, auction_id: Uuid, caller_id: &str) -> AuctionResult<AuctionView> {
        let auction = self.store.get(auction_id).await?;
        if !auction.is_participant(caller_id) {
            return Err(AuctionError::NotInvited);
        }
        Ok(auction.view_at(Utc::now()))
    }

    /// Ledger view, ascending by creation time. Same audience as
    /// `auction_view`.
    pub async fn list_bids(&self, auction_id: Uuid, caller_id: &str) -> AuctionResult<Vec<Bid>> {
        let auction = self.store.get(auction_id).await?;
        if !auction.is_participant(caller_id) {
            return Err(AuctionError::NotInvited);
        }
        self.ledger.list_for(auction_id).await
    }

    /// Seller-only `active -> cancelled`. Standing bids are overridden;
    /// no winner is declared and no downstream order is emitted.
    pub async fn cancel_auction(&self, auction_id: Uuid, caller_id: &str) -> AuctionResult<Auction> {
        self.store.get(auction_id).await?;
        let guard = self.auction_guard(auction_id);
        let lock = guard.lock().await;

        let mut auction = self.store.get(auction_id).await?;
        if !auction.is_seller(caller_id) {
            return Err(AuctionError::NotSeller);
        }
        if !auction.state.can_transition_to(AuctionState::Cancelled) {
            let state = auction.state;
            drop(lock);
            if state.is_terminal() {
                self.release_auction_guard(auction_id);
            }
            return Err(AuctionError::InvalidState(format!(
                "cannot cancel auction in state {state}"
            )));
        }

        let transition =
            AuctionTransition::new(auction.state, AuctionState::Cancelled, "seller cancel");
        auction.state = AuctionState::Cancelled;
        auction.updated_at = Utc::now();
        self.store.update(&auction).await?;
        drop(lock);
        self.release_auction_guard(auction_id);

        debug!(
            auction_id = %auction.id,
            from = %transition.from,
            to = %transition.to,
            "state transition"
        );
        // The room still learns the auction ended; a cancelled auction
        // never has a winner
        self.broadcaster.publish(
            &auction.deal_room_id,
            AuctionEvent::Closed {
                auction_id,
                deal_room_id: auction.deal_room_id.clone(),
                winner_id: None,
                final_amount: None,
                has_winner: false,
            },
        );
        info!(auction_id = %auction_id, room = %auction.deal_room_id, "auction cancelled by seller");
        Ok(auction)
    }

    /// `active -> closed`, with the winner taken from the current highest
    /// bid. Re-closing a closed auction is a no-op success; a scheduled
    /// fire against a cancelled auction is absorbed silently, while a
    /// force-close of one is an error.
    pub async fn close_auction(
        &self,
        auction_id: Uuid,
        trigger: CloseTrigger,
    ) -> AuctionResult<Auction> {
        self.store.get(auction_id).await?;
        let guard = self.auction_guard(auction_id);
        let lock = guard.lock().await;

        let mut auction = self.store.get(auction_id).await?;
        match auction.state {
            AuctionState::Closed => {
                debug!(auction_id = %auction_id, "close requested on closed auction, no-op");
                drop(lock);
                self.release_auction_guard(auction_id);
                return Ok(auction);
            }
            AuctionState::Cancelled => {
                drop(lock);
                self.release_auction_guard(auction_id);
                return match trigger {
                    CloseTrigger::Schedule => {
                        debug!(auction_id = %auction_id, "scheduled close absorbed, auction cancelled");
                        Ok(auction)
                    }
                    CloseTrigger::Force => Err(AuctionError::InvalidState(
                        "cannot close auction in state cancelled".to_string(),
                    )),
                };
            }
            AuctionState::Pending => {
                if trigger == CloseTrigger::Force {
                    return Err(AuctionError::InvalidState(
                        "cannot close auction in state pending".to_string(),
                    ));
                }
                // Activation never fired but the window still ended at end_at
                auction.state = AuctionState::Active;
            }
            AuctionState::Active => {}
        }

        let winner = auction.highest_bid.clone();
        let transition = AuctionTransition::new(auction.state, AuctionState::Closed, trigger.as_str());
        auction.state = AuctionState::Closed;
        auction.updated_at = Utc::now();
        self.store.update(&auction).await?;
        drop(lock);
        self.release_auction_guard(auction_id);

        debug!(
            auction_id = %auction.id,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            "state transition"
        );
        self.broadcaster.publish(
            &auction.deal_room_id,
            AuctionEvent::Closed {
                auction_id,
                deal_room_id: auction.deal_room_id.clone(),
                winner_id: winner.as_ref().map(|bid| bid.bidder_id.clone()),
                final_amount: winner.as_ref().map(|bid| bid.amount),
                has_winner: winner.is_some(),
            },
        );

        match &winner {
            Some(bid) => {
                self.broadcaster.emit_order_created(OrderCreated {
                    order_id: Uuid::new_v4(),
                    deal_room_id: auction.deal_room_id.clone(),
                    buyer_id: bid.bidder_id.clone(),
                    seller_id: auction.seller_id.clone(),
                    amount: bid.amount,
                    auction_id,
                });
                info!(
                    auction_id = %auction_id,
                    winner = %bid.bidder_id,
                    amount = %bid.amount,
                    trigger = %trigger,
                    "auction closed with winner"
                );
            }
            None => {
                info!(auction_id = %auction_id, trigger = %trigger, "auction closed with no bids");
            }
        }
        Ok(auction)
    }

    /// Hand a close deadline to the scheduler
    pub async fn schedule_close(&self, auction_id: Uuid, at: DateTime<Utc>) -> AuctionResult<()> {
        self.scheduler.schedule_close(auction_id, at).await
    }

    /// Subscribe to a deal room's event stream. Unknown rooms are
    /// refused, which keeps the channel map keyed by rooms that exist.
    pub async fn subscribe_room(
        &self,
        deal_room_id: &str,
    ) -> AuctionResult<broadcast::Receiver<AuctionEvent>> {
        self.rooms
            .get(deal_room_id)
            .await?
            .ok_or_else(|| AuctionError::RoomNotFound {
                deal_room_id: deal_room_id.to_string(),
            })?;
        Ok(self.broadcaster.subscribe(deal_room_id))
    }

    /// Startup sweep: close live auctions whose window already ended,
    /// re-arm timers for the rest.
    pub async fn recover(&self) -> AuctionResult<RecoveryReport> {
        let live = self.store.list_live().await?;
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for auction in live {
            match auction.state {
                AuctionState::Pending if auction.start_at <= now => {
                    self.activate_auction(auction.id).await?;
                    report.activated += 1;
                    if auction.end_at <= now {
                        self.close_auction(auction.id, CloseTrigger::Schedule).await?;
                        report.closed_overdue += 1;
                    } else {
                        self.scheduler.schedule_close(auction.id, auction.end_at).await?;
                        report.rescheduled += 1;
                    }
                }
                AuctionState::Pending => {
                    self.scheduler.schedule_open(auction.id, auction.start_at).await?;
                    self.scheduler.schedule_close(auction.id, auction.end_at).await?;
                    report.rescheduled += 1;
                }
                AuctionState::Active if auction.end_at <= now => {
                    self.close_auction(auction.id, CloseTrigger::Schedule).await?;
                    report.closed_overdue += 1;
                }
                AuctionState::Active => {
                    self.scheduler.schedule_close(auction.id, auction.end_at).await?;
                    report.rescheduled += 1;
                }
                _ => {}
            }
        }
        Ok(report)
    }

    async fn handle_deadline(&self, deadline: Deadline) {
        let result = match deadline.kind {
            DeadlineKind::Open => self.activate_auction(deadline.auction_id).await.map(|_| ()),
            DeadlineKind::Close => self
                .close_auction(deadline.auction_id, CloseTrigger::Schedule)
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!(
                auction_id = %deadline.auction_id,
                kind = ?deadline.kind,
                error = %e,
                "scheduled transition failed"
            );
        }
    }

    fn broadcast_started(&self, auction: &Auction) {
        self.broadcaster.publish(
            &auction.deal_room_id,
            AuctionEvent::Started {
                auction_id: auction.id,
                deal_room_id: auction.deal_room_id.clone(),
                start_price: auction.start_price,
                min_increment: auction.min_increment,
                end_at: auction.end_at,
            },
        );
    }

    fn auction_guard(&self, auction_id: Uuid) -> Arc<Mutex<()>> {
        self.auction_locks
            .entry(auction_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop an auction's arena slot. Safe only once the auction is
    /// terminal: any straggler still holding the old mutex re-reads the
    /// record under it and finds a state that admits no writes.
    fn release_auction_guard(&self, auction_id: Uuid) {
        self.auction_locks.remove(&auction_id);
    }

    fn room_guard(&self, deal_room_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(deal_room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Longest accepted bidding window, one year in minutes
const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

fn validate_params(params: &AuctionParams) -> AuctionResult<()> {
    if params.start_price <= Decimal::ZERO {
        return Err(AuctionError::InvalidAmount(
            "start price must be positive".to_string(),
        ));
    }
    if params.min_increment <= Decimal::ZERO {
        return Err(AuctionError::InvalidAmount(
            "minimum increment must be positive".to_string(),
        ));
    }
    if params.duration_minutes <= 0 {
        return Err(AuctionError::InvalidAmount(
            "duration must be a positive number of minutes".to_string(),
        ));
    }
    if params.duration_minutes > MAX_DURATION_MINUTES {
        return Err(AuctionError::InvalidAmount(format!(
            "duration must be at most {MAX_DURATION_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn dedupe_invitees(invitee_ids: &mut Vec<String>) {
    let mut seen = HashSet::new();
    invitee_ids.retain(|id| seen.insert(id.clone()));
}

/// The engine plus its background tasks (scheduler and deadline consumer)
pub struct EngineRuntime {
    engine: Arc<AuctionEngine>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineRuntime {
    /// Wire the engine, scheduler task, and deadline consumer together.
    /// Returns the runtime and the receiving end of the downstream
    /// workflow queue.
    pub fn start(
        store: Arc<dyn AuctionStore>,
        ledger: Arc<dyn BidLedger>,
        rooms: Arc<dyn DealRoomRepository>,
        config: &EngineConfig,
    ) -> (Self, mpsc::Receiver<OrderCreated>) {
        let (broadcaster, workflow_rx) =
            EventBroadcaster::new(config.event_buffer, config.workflow_queue);
        let (scheduler_handle, scheduler, mut due_rx) =
            AuctionScheduler::new(config.scheduler_queue);
        let (shutdown_tx, _) = broadcast::channel(1);

        let engine = Arc::new(AuctionEngine {
            store,
            ledger,
            rooms,
            broadcaster: Arc::new(broadcaster),
            scheduler: scheduler_handle,
            auction_locks: DashMap::new(),
            room_locks: DashMap::new(),
        });

        let scheduler_task = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

        let closer_task = {
            let engine = engine.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        maybe = due_rx.recv() => match maybe {
                            Some(deadline) => engine.handle_deadline(deadline).await,
                            None => break,
                        },
                        _ = shutdown_rx.recv() => break,
                    }
                }
            })
        };

        (
            Self {
                engine,
                shutdown_tx,
                tasks: vec![scheduler_task, closer_task],
            },
            workflow_rx,
        )
    }

    pub fn engine(&self) -> Arc<AuctionEngine> {
        self.engine.clone()
    }

    /// Stop the timer tasks and wait for them to drain
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
