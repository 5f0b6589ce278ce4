//! Outbox Dispatch Scheduler
//!
//! Periodically pulls a batch of PENDING messages, hands each one to the
//! [`MessageSender`], records the SENT transition in the store and writes the
//! result through to the recent-sent cache.
//!
//! Failed sends leave the message PENDING; it is picked up again on a later
//! tick. There is no attempt counter and no backoff.

use std::sync::Arc;
use std::time::Duration;

use relay_common::{Message, SentMessageEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{MessageRepository, MessageSender, SentMessageCache};

#[derive(Debug, Clone)]
pub struct DispatchSchedulerConfig {
    /// Time between ticks. The first tick runs immediately on start.
    pub interval: Duration,
    /// Maximum messages dispatched per tick
    pub batch_size: u32,
}

impl Default for DispatchSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            batch_size: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Outcome counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
    pub store_failures: usize,
    pub cache_failures: usize,
}

/// Executes a single dispatch pass. Cheap to clone; the background loop owns
/// its own clone.
#[derive(Clone)]
pub struct OutboxDispatcher {
    repository: Arc<dyn MessageRepository>,
    sender: Arc<dyn MessageSender>,
    cache: Option<Arc<dyn SentMessageCache>>,
    batch_size: u32,
}

impl OutboxDispatcher {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        sender: Arc<dyn MessageSender>,
        cache: Option<Arc<dyn SentMessageCache>>,
        batch_size: u32,
    ) -> Self {
        Self {
            repository,
            sender,
            cache,
            batch_size,
        }
    }

    /// Run one tick: fetch, dispatch in order, record outcomes.
    ///
    /// Never fails; every error is logged and counted.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let pending = match self.repository.fetch_pending(self.batch_size).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending messages");
                return summary;
            }
        };

        summary.fetched = pending.len();
        if pending.is_empty() {
            debug!("No pending messages to dispatch");
            return summary;
        }

        debug!(count = pending.len(), "Dispatching pending messages");

        for message in &pending {
            self.dispatch_one(message, &mut summary).await;
        }

        info!(
            fetched = summary.fetched,
            sent = summary.sent,
            failed = summary.failed,
            "Dispatch tick complete"
        );
        summary
    }

    async fn dispatch_one(&self, message: &Message, summary: &mut TickSummary) {
        let response = match self.sender.send(&message.to, &message.content).await {
            Ok(response) => response,
            Err(e) => {
                error!(message_id = message.id, error = %e, "Failed to send message");
                summary.failed += 1;
                return;
            }
        };

        let sent_at = relay_common::now_millis();
        if let Err(e) = self
            .repository
            .mark_sent(message.id, &response.message_id, sent_at)
            .await
        {
            error!(
                message_id = message.id,
                external_message_id = %response.message_id,
                error = %e,
                "Message was sent but its status could not be updated"
            );
            summary.store_failures += 1;
            return;
        }

        summary.sent += 1;
        info!(
            message_id = message.id,
            external_message_id = %response.message_id,
            "Message sent"
        );

        if let Some(cache) = &self.cache {
            let entry = SentMessageEntry::from_sent(message, &response.message_id, sent_at);
            if let Err(e) = cache.put(&entry).await {
                warn!(message_id = message.id, error = %e, "Failed to cache sent message");
                summary.cache_failures += 1;
            }
        }
    }
}

struct RunningLoop {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the background dispatch loop. At most one loop runs per instance.
pub struct DispatchScheduler {
    dispatcher: OutboxDispatcher,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl DispatchScheduler {
    pub fn new(dispatcher: OutboxDispatcher, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn from_config(
        config: &DispatchSchedulerConfig,
        repository: Arc<dyn MessageRepository>,
        sender: Arc<dyn MessageSender>,
        cache: Option<Arc<dyn SentMessageCache>>,
    ) -> Self {
        let dispatcher = OutboxDispatcher::new(repository, sender, cache, config.batch_size);
        Self::new(dispatcher, config.interval)
    }

    /// Spawn the dispatch loop and return immediately. No-op if already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;

        if let Some(existing) = running.as_ref() {
            if !existing.handle.is_finished() {
                warn!("Dispatch scheduler already running");
                return;
            }
            warn!("Previous dispatch loop exited unexpectedly, restarting");
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_loop(self.dispatcher.clone(), self.interval, shutdown_rx));

        *running = Some(RunningLoop { shutdown_tx, handle });
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.dispatcher.batch_size,
            "Dispatch scheduler started"
        );
    }

    /// Signal the loop and wait until it has exited. A tick in progress is
    /// allowed to finish. No-op if not running.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;

        let Some(RunningLoop { shutdown_tx, handle }) = running.take() else {
            debug!("Dispatch scheduler is not running");
            return;
        };

        // The loop may already be gone, in which case there is no receiver
        let _ = shutdown_tx.send(());
        if let Err(e) = handle.await {
            error!(error = %e, "Dispatch loop terminated abnormally");
        }

        info!("Dispatch scheduler stopped");
    }

    pub async fn state(&self) -> SchedulerState {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(lp) if !lp.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }

    /// Run one tick on the caller's task, independent of the loop.
    pub async fn tick(&self) -> TickSummary {
        self.dispatcher.tick().await
    }
}

async fn run_loop(dispatcher: OutboxDispatcher, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Dispatch loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                dispatcher.tick().await;
            }
        }
    }
}
