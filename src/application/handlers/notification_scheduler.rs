//! Periodic dispatch of scheduled broadcasts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    application::{
        handlers::prune_unreachable,
        services::{broadcaster::Broadcaster, messenger::MessengerClient},
    },
    domain::{
        models::{BroadcastOutcome, Message, ScheduledBroadcast},
        repositories::{RecipientDirectory, ScheduledBroadcastRepository},
    },
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Wait before the next tick when a tick failed as a whole.
    pub error_backoff: Duration,
    pub batch_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(5),
            batch_limit: 50,
        }
    }
}

pub struct NotificationScheduler {
    store: Arc<dyn ScheduledBroadcastRepository>,
    directory: Arc<dyn RecipientDirectory>,
    client: Arc<dyn MessengerClient>,
    broadcaster: Broadcaster,
    config: SchedulerConfig,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn ScheduledBroadcastRepository>,
        directory: Arc<dyn RecipientDirectory>,
        client: Arc<dyn MessengerClient>,
        broadcaster: Broadcaster,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            directory,
            client,
            broadcaster,
            config,
            running: Mutex::new(None),
        })
    }

    /// Spawns the background loop. Calling it while running does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("Scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(scheduler.run(cancel.clone()));
        *running = Some((cancel, handle));

        tracing::info!(
            tick_seconds = self.config.tick_interval.as_secs(),
            batch_limit = self.config.batch_limit,
            "Scheduler started"
        );
    }

    /// Cancels the loop and waits for it to finish. A tick that is already
    /// sending is cut off at its next await point.
    pub async fn stop(&self) {
        let Some((cancel, handle)) = self.running.lock().await.take() else {
            return;
        };
        cancel.cancel();
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Scheduler task ended abnormally");
        }
        tracing::info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let wait = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.run_tick(Utc::now()) => match result {
                    Ok(_) => self.config.tick_interval,
                    Err(err) => {
                        tracing::error!(error = %err, "Scheduler tick failed");
                        self.config.error_backoff
                    }
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Dispatches everything due at `now`. Returns how many items were
    /// processed without error.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let due = self.store.list_due(now, self.config.batch_limit).await?;
        if due.is_empty() {
            return Ok(0);
        }
        tracing::info!(due = due.len(), "Processing scheduled broadcasts");

        let mut processed = 0;
        for item in due {
            match self.dispatch(&item, now).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    tracing::error!(
                        scheduled_id = item.id,
                        error = %err,
                        "Scheduled broadcast failed"
                    );
                }
            }
        }
        Ok(processed)
    }

    async fn dispatch(&self, item: &ScheduledBroadcast, now: DateTime<Utc>) -> anyhow::Result<()> {
        let message = item.to_message();
        let recipients = self.directory.all_recipients().await?;

        if recipients.is_empty() {
            tracing::info!(scheduled_id = item.id, "No subscribers for scheduled broadcast");
        } else {
            let mut outcome = self
                .broadcaster
                .broadcast(&recipients, self.client.as_ref(), &message)
                .await;

            if !outcome.transiently_failed.is_empty() && message.rich_formatting() {
                outcome = self.retry_plain(item, &message, outcome).await;
            }

            prune_unreachable(self.directory.as_ref(), &outcome.permanently_failed).await;

            tracing::info!(
                scheduled_id = item.id,
                succeeded = outcome.succeeded,
                total = outcome.total,
                duration_ms = outcome.duration_ms,
                "Scheduled broadcast sent"
            );
        }

        let next_run_at = item.next_run_after(now);
        self.store.mark_sent(item.id, now, next_run_at).await?;
        tracing::debug!(scheduled_id = item.id, next_run_at = %next_run_at, "Rescheduled");
        Ok(())
    }

    async fn retry_plain(
        &self,
        item: &ScheduledBroadcast,
        message: &Message,
        outcome: BroadcastOutcome,
    ) -> BroadcastOutcome {
        tracing::warn!(
            scheduled_id = item.id,
            recipients = outcome.transiently_failed.len(),
            render_mode = message.render_mode.as_str(),
            "Retrying failed recipients without formatting"
        );
        let plain = message.as_plain();
        let fallback = self
            .broadcaster
            .broadcast(&outcome.transiently_failed, self.client.as_ref(), &plain)
            .await;
        outcome.merge_fallback(fallback)
    }
}
