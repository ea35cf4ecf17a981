//! Mention poller — periodic ingest → persist cursor → process.
//!
//! The cursor is written as soon as a batch is fetched, before any item is
//! processed. A crash mid-batch therefore skips the rest of that batch
//! rather than replaying it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::DatabaseError;
use crate::feed::ItemId;
use crate::pipeline::ingestor::MentionIngestor;
use crate::pipeline::processor::{ItemOutcome, SubmissionProcessor};
use crate::store::Database;

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub cursor: Option<ItemId>,
    pub outcomes: Vec<ItemOutcome>,
}

pub struct MentionPoller {
    ingestor: MentionIngestor,
    processor: Arc<SubmissionProcessor>,
    db: Arc<dyn Database>,
    running: Mutex<()>,
}

impl MentionPoller {
    pub fn new(
        ingestor: MentionIngestor,
        processor: Arc<SubmissionProcessor>,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            ingestor,
            processor,
            db,
            running: Mutex::new(()),
        }
    }

    /// Run a single cycle. Returns `None` when a cycle is already running.
    pub async fn poll_once(&self) -> Option<PollSummary> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Previous poll still running; skipping tick");
            return None;
        };

        let cursor = match self.db.get_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!(error = %e, "Failed to read cursor; skipping cycle");
                return Some(PollSummary::default());
            }
        };

        let batch = self.ingestor.fetch_new_items(cursor).await;
        if batch.items.is_empty() {
            return Some(PollSummary {
                fetched: 0,
                cursor,
                outcomes: Vec::new(),
            });
        }

        if let Some(next) = batch.cursor
            && Some(next) != cursor
            && let Err(e) = self.db.set_cursor(next).await
        {
            // Processing still runs; every step tolerates replay.
            error!(cursor = %next, error = %e, "Failed to persist cursor");
        }

        info!(count = batch.items.len(), cursor = ?batch.cursor, "Processing new mentions");
        let outcomes = self.processor.process_batch(&batch.items).await;

        Some(PollSummary {
            fetched: batch.items.len(),
            cursor: batch.cursor,
            outcomes,
        })
    }

    pub async fn cursor(&self) -> Result<Option<ItemId>, DatabaseError> {
        self.db.get_cursor().await
    }

    /// Overwrite the stored cursor, e.g. to rewind for a replay.
    pub async fn set_cursor(&self, cursor: ItemId) -> Result<(), DatabaseError> {
        info!(cursor = %cursor, "Cursor set manually");
        self.db.set_cursor(cursor).await
    }
}

/// Handle to a running poller task.
pub struct PollerHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollerHandle {
    /// Signal the task and wait for the in-flight cycle to finish.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
        if let Err(e) = self.handle.await {
            error!("Poller task panicked: {e}");
        }
    }
}

/// Spawn the periodic poller. The first cycle runs immediately.
pub fn spawn_poller(poller: Arc<MentionPoller>, interval: Duration) -> PollerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let shutdown_flag = Arc::clone(&shutdown);
    let wake_signal = Arc::clone(&wake);

    let handle = tokio::spawn(async move {
        info!("Mention poller started, polling every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = wake.notified() => {}
            }

            if shutdown.load(Ordering::Relaxed) {
                info!("Mention poller shutting down");
                return;
            }

            poller.poll_once().await;
        }
    });

    PollerHandle {
        handle,
        shutdown: shutdown_flag,
        wake: wake_signal,
    }
}
