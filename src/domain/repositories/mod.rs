use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    events::EventKind,
    models::{RecipientId, RecipientPreference, ScheduledBroadcast},
};

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn all_recipients(&self) -> anyhow::Result<Vec<RecipientId>>;
    /// Returns `false` when the recipient was not an active subscriber.
    async fn remove(&self, recipient: RecipientId) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Bulk resolution of the recipients that want any of `kinds` for
    /// `variant`. `Ok(None)` means the backend cannot answer in bulk and the
    /// caller must evaluate preferences one recipient at a time.
    async fn resolve_recipients(
        &self,
        _kinds: &[EventKind],
        _variant: &str,
    ) -> anyhow::Result<Option<HashSet<RecipientId>>> {
        Ok(None)
    }

    async fn get_preference(
        &self,
        recipient: RecipientId,
    ) -> anyhow::Result<Option<RecipientPreference>>;

    async fn save_preference(
        &self,
        recipient: RecipientId,
        preference: &RecipientPreference,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LanguageRepository: Send + Sync {
    async fn get_language(&self, recipient: RecipientId) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait ScheduledBroadcastRepository: Send + Sync {
    /// Enabled items with `next_run_at <= now`, oldest first, at most `limit`.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ScheduledBroadcast>>;

    async fn mark_sent(
        &self,
        id: i64,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}
