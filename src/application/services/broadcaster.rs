//! Rate-limited fan-out of one message to many recipients.
//!
//! Recipients are sent to in chunks of `max_concurrent`. Every send in a
//! chunk runs concurrently and the chunk is awaited as a whole before the
//! next one starts, with `delay_between_batches` in between. That pause is
//! what keeps the transport under its per-second cap.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    application::services::{
        classifier::{Classifier, FailureClass, classify_failure},
        messenger::MessengerClient,
    },
    domain::models::{BroadcastOutcome, Message, RecipientId},
};

#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub max_concurrent: usize,
    pub delay_between_batches: Duration,
    pub max_retries: u32,
    /// Retry `n` waits `backoff_base * 2^n`.
    pub backoff_base: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 30,
            delay_between_batches: Duration::from_secs(1),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Permanent,
    Transient,
}

/// Stateless dispatcher. It never touches the recipient directory; callers
/// prune `permanently_failed` themselves.
#[derive(Clone)]
pub struct Broadcaster {
    config: BroadcasterConfig,
    classifier: Classifier,
}

impl Broadcaster {
    pub fn new(mut config: BroadcasterConfig) -> Self {
        config.max_concurrent = config.max_concurrent.max(1);
        Self {
            config,
            classifier: classify_failure,
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn broadcast(
        &self,
        recipients: &[RecipientId],
        client: &dyn MessengerClient,
        message: &Message,
    ) -> BroadcastOutcome {
        let started = Instant::now();
        let broadcast_id = Uuid::new_v4();
        let total = recipients.len();
        let chunks: Vec<&[RecipientId]> = recipients.chunks(self.config.max_concurrent).collect();

        tracing::info!(
            broadcast_id = %broadcast_id,
            recipients = total,
            chunks = chunks.len(),
            "Starting broadcast"
        );

        let mut outcome = BroadcastOutcome {
            broadcast_id,
            attempted: total,
            total,
            ..BroadcastOutcome::empty()
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let results = join_all(
                chunk
                    .iter()
                    .map(|recipient| self.send_with_retry(*recipient, client, message)),
            )
            .await;

            for (recipient, result) in chunk.iter().zip(results) {
                match result {
                    Delivery::Sent => outcome.succeeded += 1,
                    Delivery::Permanent => outcome.permanently_failed.push(*recipient),
                    Delivery::Transient => outcome.transiently_failed.push(*recipient),
                }
            }

            tracing::debug!(
                broadcast_id = %broadcast_id,
                chunk = index + 1,
                of = chunks.len(),
                succeeded = outcome.succeeded,
                failed = outcome.failed(),
                "Broadcast chunk finished"
            );

            if index + 1 < chunks.len() {
                tokio::time::sleep(self.config.delay_between_batches).await;
            }
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            broadcast_id = %broadcast_id,
            succeeded = outcome.succeeded,
            total,
            permanent = outcome.permanently_failed.len(),
            transient = outcome.transiently_failed.len(),
            duration_ms = outcome.duration_ms,
            "Broadcast completed"
        );

        outcome
    }

    async fn send_with_retry(
        &self,
        recipient: RecipientId,
        client: &dyn MessengerClient,
        message: &Message,
    ) -> Delivery {
        let mut retries = 0u32;

        loop {
            let err = match client.send(recipient, message).await {
                Ok(()) => return Delivery::Sent,
                Err(err) => err,
            };

            match (self.classifier)(&err) {
                FailureClass::Permanent => {
                    tracing::warn!(recipient = %recipient, error = %err, "Recipient unreachable");
                    return Delivery::Permanent;
                }
                FailureClass::Transient if retries < self.config.max_retries => {
                    retries += 1;
                    let wait = self.config.backoff_base * 2u32.saturating_pow(retries);
                    tracing::warn!(
                        recipient = %recipient,
                        error = %err,
                        attempt = retries,
                        max_retries = self.config.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        "Temporary send failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                FailureClass::Transient => {
                    tracing::error!(
                        recipient = %recipient,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Delivery::Transient;
                }
                FailureClass::Unknown => {
                    tracing::error!(recipient = %recipient, error = %err, "Send failed");
                    return Delivery::Transient;
                }
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcasterConfig::default())
    }
}
