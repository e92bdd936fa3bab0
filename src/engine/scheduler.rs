//! Auction Scheduler
//!
//! Fires time-based transitions (activation at `start_at`, close at
//! `end_at`) independent of bid traffic. A single task owns a min-heap of
//! deadlines and sleeps until the nearest one; due deadlines are handed to
//! the engine's consumer over a channel. Delivery is at-least-once: the
//! idempotent transitions absorb duplicates, so restarts and re-schedules
//! never need coordination with the heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AuctionError, AuctionResult};

/// Which transition a deadline requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    /// `pending -> active` at `start_at`
    Open,
    /// `active -> closed` at `end_at`
    Close,
}

#[derive(Debug, Clone)]
pub struct Deadline {
    pub auction_id: Uuid,
    pub kind: DeadlineKind,
    pub at: DateTime<Utc>,
}

/// Heap entry; `seq` keeps firing FIFO for equal timestamps
struct HeapEntry {
    deadline: Deadline,
    seq: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.at == other.deadline.at && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest deadline pops first
        other
            .deadline
            .at
            .cmp(&self.deadline.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Clonable handle for submitting deadlines
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Deadline>,
}

impl SchedulerHandle {
    pub async fn schedule_close(&self, auction_id: Uuid, at: DateTime<Utc>) -> AuctionResult<()> {
        self.schedule(Deadline {
            auction_id,
            kind: DeadlineKind::Close,
            at,
        })
        .await
    }

    pub async fn schedule_open(&self, auction_id: Uuid, at: DateTime<Utc>) -> AuctionResult<()> {
        self.schedule(Deadline {
            auction_id,
            kind: DeadlineKind::Open,
            at,
        })
        .await
    }

    async fn schedule(&self, deadline: Deadline) -> AuctionResult<()> {
        self.tx
            .send(deadline)
            .await
            .map_err(|_| AuctionError::Internal("scheduler unavailable".to_string()))
    }
}

/// The timer task. Created together with its handle and the due-deadline
/// receiver; `run` is spawned by the engine runtime.
pub struct AuctionScheduler {
    rx: mpsc::Receiver<Deadline>,
    due_tx: mpsc::Sender<Deadline>,
    heap: BinaryHeap<HeapEntry>,
    seq: u64,
}

impl AuctionScheduler {
    pub fn new(queue: usize) -> (SchedulerHandle, AuctionScheduler, mpsc::Receiver<Deadline>) {
        let (tx, rx) = mpsc::channel(queue);
        let (due_tx, due_rx) = mpsc::channel(queue);
        (
            SchedulerHandle { tx },
            Self {
                rx,
                due_tx,
                heap: BinaryHeap::new(),
                seq: 0,
            },
            due_rx,
        )
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("auction scheduler started");

        loop {
            let next_at = self.heap.peek().map(|entry| entry.deadline.at);

            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(deadline) => self.push(deadline),
                    // All handles dropped; nothing can be scheduled anymore
                    None => break,
                },
                _ = Self::sleep_until_deadline(next_at), if next_at.is_some() => {
                    if !self.fire_due().await {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("scheduler received shutdown");
                    break;
                }
            }
        }

        info!(pending = self.heap.len(), "auction scheduler stopped");
    }

    fn push(&mut self, deadline: Deadline) {
        debug!(
            auction_id = %deadline.auction_id,
            kind = ?deadline.kind,
            at = %deadline.at,
            "deadline scheduled"
        );
        self.seq += 1;
        self.heap.push(HeapEntry {
            deadline,
            seq: self.seq,
        });
    }

    /// Pop and deliver everything due; false when the consumer is gone
    async fn fire_due(&mut self) -> bool {
        let now = Utc::now();

        loop {
            let due = matches!(self.heap.peek(), Some(entry) if entry.deadline.at <= now);
            if !due {
                return true;
            }

            let Some(entry) = self.heap.pop() else {
                return true;
            };
            let deadline = entry.deadline;
            debug!(
                auction_id = %deadline.auction_id,
                kind = ?deadline.kind,
                "deadline fired"
            );

            if self.due_tx.send(deadline).await.is_err() {
                warn!("deadline consumer gone, scheduler stopping");
                return false;
            }
        }
    }

    async fn sleep_until_deadline(at: Option<DateTime<Utc>>) {
        // Guarded by `if next_at.is_some()` in the select
        let Some(at) = at else { return };
        let delay = (at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        sleep_until(Instant::now() + delay).await;
    }
}
