//! Event batching with debounce-and-reset.
//!
//! Every event is filed under its group key. Each arrival cancels the
//! group's pending flush timer and starts a fresh one, so a group is only
//! flushed once it has been quiet for `batch_delay`. A flush resolves
//! recipients, splits them by language, composes one message per language
//! and hands each to the broadcaster.
//!
//! Continuous activity on one key postpones its flush indefinitely; there is
//! no max-wait cap.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    application::{
        handlers::prune_unreachable,
        services::{broadcaster::Broadcaster, composer::MessageComposer, messenger::MessengerClient},
    },
    domain::{
        events::{DomainEvent, EventKind},
        models::{Message, NotificationGroup, RecipientId, RenderMode},
        repositories::{LanguageRepository, PreferenceRepository, RecipientDirectory},
    },
};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub batch_delay: Duration,
    /// Used when a recipient's language is unknown or cannot be read.
    pub default_language: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_secs(3),
            default_language: "fa".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ManagerRepositories {
    pub preferences: Arc<dyn PreferenceRepository>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub languages: Arc<dyn LanguageRepository>,
}

struct PendingGroup {
    group: NotificationGroup,
    timer_id: u64,
    cancel: CancellationToken,
}

pub struct NotificationManager {
    repos: ManagerRepositories,
    client: Arc<dyn MessengerClient>,
    broadcaster: Broadcaster,
    composer: MessageComposer,
    config: ManagerConfig,
    pending: Mutex<HashMap<String, PendingGroup>>,
    next_timer_id: AtomicU64,
    runtime: Handle,
}

impl NotificationManager {
    /// Flush timers run on the Tokio runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        repos: ManagerRepositories,
        client: Arc<dyn MessengerClient>,
        broadcaster: Broadcaster,
        composer: MessageComposer,
        config: ManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            repos,
            client,
            broadcaster,
            composer,
            config,
            pending: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(1),
            runtime: Handle::current(),
        })
    }

    /// Queues an event for the next flush of its group. Only touches
    /// in-memory state.
    pub fn enqueue(self: &Arc<Self>, event: DomainEvent) {
        let kind = event.kind();
        if !self.composer.settings().is_event_enabled(kind) {
            tracing::info!(event_kind = %kind, "Notification disabled, skipping");
            return;
        }

        let key = event.group_key();
        let timer_id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let queued = {
            let mut pending = self.lock_pending();
            match pending.get_mut(&key) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry.cancel = cancel.clone();
                    entry.timer_id = timer_id;
                    entry.group.push(event);
                    entry.group.events.len()
                }
                None => {
                    pending.insert(
                        key.clone(),
                        PendingGroup {
                            group: NotificationGroup::new(event),
                            timer_id,
                            cancel: cancel.clone(),
                        },
                    );
                    1
                }
            }
        };

        tracing::debug!(group_key = %key, event_kind = %kind, queued, "Notification queued");

        let manager = Arc::clone(self);
        self.runtime
            .spawn(async move { manager.run_timer(key, timer_id, cancel).await });
    }

    /// Parses the loosely-typed form and queues it. Invalid input is logged
    /// and dropped.
    pub fn enqueue_payload(self: &Arc<Self>, kind: &str, payload: &serde_json::Value) {
        match DomainEvent::from_payload(kind, payload) {
            Ok(event) => self.enqueue(event),
            Err(err) => {
                tracing::warn!(event_kind = kind, error = %err, "Rejected notification event");
            }
        }
    }

    pub fn pending_groups(&self) -> usize {
        self.lock_pending().len()
    }

    /// Cancels every pending timer and flushes all groups now.
    pub async fn flush_pending(&self) {
        let groups: Vec<NotificationGroup> = {
            let mut pending = self.lock_pending();
            pending
                .drain()
                .map(|(_, entry)| {
                    entry.cancel.cancel();
                    entry.group
                })
                .collect()
        };

        if !groups.is_empty() {
            tracing::info!(groups = groups.len(), "Flushing pending notifications");
        }
        for group in groups {
            self.flush_group(group).await;
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingGroup>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_timer(self: Arc<Self>, key: String, timer_id: u64, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::trace!(group_key = %key, "Flush superseded");
                return;
            }
            _ = tokio::time::sleep(self.config.batch_delay) => {}
        }

        // A newer event may have replaced this timer between the sleep ending
        // and the lock being taken.
        let group = {
            let mut pending = self.lock_pending();
            let current = pending
                .get(&key)
                .is_some_and(|entry| entry.timer_id == timer_id);
            if current {
                pending.remove(&key).map(|entry| entry.group)
            } else {
                None
            }
        };

        if let Some(group) = group {
            self.flush_group(group).await;
        }
    }

    async fn flush_group(&self, group: NotificationGroup) {
        let kinds = group.event_kinds();
        let variant = group.base_info.variant.clone();

        let recipients = self.resolve_recipients(&kinds, &variant).await;
        tracing::info!(
            group_key = %group.key,
            events = group.events.len(),
            recipients = recipients.len(),
            "Flushing notification group"
        );
        if recipients.is_empty() {
            return;
        }

        let action_ref = group.base_info.action_ref();
        for (lang, users) in self.group_by_language(recipients).await {
            let Some(text) = self.composer.compose(&group, &lang) else {
                tracing::debug!(group_key = %group.key, lang = %lang, "Nothing to send");
                continue;
            };
            let message = Message::text(text, RenderMode::Markdown)
                .with_action(self.composer.action_label(&lang), action_ref.clone());

            let outcome = self
                .broadcaster
                .broadcast(&users, self.client.as_ref(), &message)
                .await;
            prune_unreachable(self.repos.directory.as_ref(), &outcome.permanently_failed).await;

            tracing::info!(
                group_key = %group.key,
                lang = %lang,
                succeeded = outcome.succeeded,
                total = outcome.total,
                duration_ms = outcome.duration_ms,
                rate_per_second = outcome.rate_per_second(),
                "Notification broadcast completed"
            );
        }
    }

    /// Resolution errors yield nobody rather than everybody.
    async fn resolve_recipients(&self, kinds: &[EventKind], variant: &str) -> HashSet<RecipientId> {
        let resolved = match self.repos.preferences.resolve_recipients(kinds, variant).await {
            Ok(Some(recipients)) => Ok(recipients),
            Ok(None) => {
                tracing::debug!("Bulk resolution unavailable, checking preferences one by one");
                self.resolve_by_preference(kinds, variant).await
            }
            Err(err) => Err(err),
        };

        resolved.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Recipient resolution failed");
            HashSet::new()
        })
    }

    async fn resolve_by_preference(
        &self,
        kinds: &[EventKind],
        variant: &str,
    ) -> anyhow::Result<HashSet<RecipientId>> {
        let mut recipients = HashSet::new();
        for recipient in self.repos.directory.all_recipients().await? {
            match self.repos.preferences.get_preference(recipient).await {
                Ok(None) => {
                    recipients.insert(recipient);
                }
                Ok(Some(pref)) if pref.wants(kinds, variant) => {
                    recipients.insert(recipient);
                }
                Ok(Some(_)) => {}
                Err(err) => {
                    tracing::debug!(recipient = %recipient, error = %err, "Skipping recipient");
                }
            }
        }
        Ok(recipients)
    }

    async fn group_by_language(
        &self,
        recipients: HashSet<RecipientId>,
    ) -> BTreeMap<String, Vec<RecipientId>> {
        let mut by_lang: BTreeMap<String, Vec<RecipientId>> = BTreeMap::new();
        let mut recipients: Vec<RecipientId> = recipients.into_iter().collect();
        recipients.sort();

        for recipient in recipients {
            let lang = match self.repos.languages.get_language(recipient).await {
                Ok(Some(lang)) if !lang.is_empty() => lang,
                Ok(_) => self.config.default_language.clone(),
                Err(err) => {
                    tracing::warn!(recipient = %recipient, error = %err, "Language lookup failed");
                    self.config.default_language.clone()
                }
            };
            by_lang.entry(lang).or_default().push(recipient);
        }
        by_lang
    }
}
