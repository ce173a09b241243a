use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    models::{RecipientId, RecipientPreference, ScheduledBroadcast},
    repositories::{
        LanguageRepository, PreferenceRepository, RecipientDirectory,
        ScheduledBroadcastRepository,
    },
};

/// Subscribers keyed by id; removal only marks them inactive.
#[derive(Default)]
pub struct InMemoryRecipientDirectory {
    subscribers: Arc<RwLock<BTreeMap<RecipientId, bool>>>,
}

impl InMemoryRecipientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(recipients: impl IntoIterator<Item = RecipientId>) -> Self {
        let subscribers = recipients.into_iter().map(|id| (id, true)).collect();
        Self {
            subscribers: Arc::new(RwLock::new(subscribers)),
        }
    }

    /// Adds or reactivates a subscriber.
    pub async fn add(&self, recipient: RecipientId) {
        self.subscribers.write().await.insert(recipient, true);
    }

    pub async fn is_active(&self, recipient: RecipientId) -> bool {
        self.subscribers
            .read()
            .await
            .get(&recipient)
            .copied()
            .unwrap_or(false)
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryRecipientDirectory {
    async fn all_recipients(&self) -> anyhow::Result<Vec<RecipientId>> {
        let subscribers = self.subscribers.read().await;
        Ok(subscribers
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn remove(&self, recipient: RecipientId) -> anyhow::Result<bool> {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(&recipient) {
            Some(active) if *active => {
                *active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Per-recipient storage only; bulk resolution is left to the caller.
#[derive(Default)]
pub struct InMemoryPreferenceRepository {
    preferences: Arc<RwLock<HashMap<RecipientId, RecipientPreference>>>,
}

impl InMemoryPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn get_preference(
        &self,
        recipient: RecipientId,
    ) -> anyhow::Result<Option<RecipientPreference>> {
        let preferences = self.preferences.read().await;
        Ok(preferences.get(&recipient).cloned())
    }

    async fn save_preference(
        &self,
        recipient: RecipientId,
        preference: &RecipientPreference,
    ) -> anyhow::Result<()> {
        let mut preferences = self.preferences.write().await;
        preferences.insert(recipient, preference.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLanguageRepository {
    languages: Arc<RwLock<HashMap<RecipientId, String>>>,
}

impl InMemoryLanguageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, recipient: RecipientId, lang: impl Into<String>) {
        self.languages.write().await.insert(recipient, lang.into());
    }
}

#[async_trait]
impl LanguageRepository for InMemoryLanguageRepository {
    async fn get_language(&self, recipient: RecipientId) -> anyhow::Result<Option<String>> {
        let languages = self.languages.read().await;
        Ok(languages.get(&recipient).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryScheduledBroadcastRepository {
    items: Arc<RwLock<HashMap<i64, ScheduledBroadcast>>>,
}

impl InMemoryScheduledBroadcastRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, item: ScheduledBroadcast) {
        self.items.write().await.insert(item.id, item);
    }

    pub async fn get(&self, id: i64) -> Option<ScheduledBroadcast> {
        self.items.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl ScheduledBroadcastRepository for InMemoryScheduledBroadcastRepository {
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ScheduledBroadcast>> {
        let items = self.items.read().await;
        let mut due: Vec<ScheduledBroadcast> =
            items.values().filter(|i| i.is_due(now)).cloned().collect();
        due.sort_by_key(|i| (i.next_run_at, i.id));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_sent(
        &self,
        id: i64,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("scheduled broadcast {id} not found"))?;
        item.last_sent_at = Some(last_sent_at);
        item.next_run_at = next_run_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::models::{BroadcastKind, RenderMode};
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_directory_soft_removal() {
        let directory =
            InMemoryRecipientDirectory::with_recipients([RecipientId(2), RecipientId(1)]);
        assert!(directory.remove(RecipientId(2)).await.unwrap());
        assert!(!directory.remove(RecipientId(2)).await.unwrap());
        assert!(!directory.remove(RecipientId(99)).await.unwrap());
        assert_eq!(directory.all_recipients().await.unwrap(), vec![RecipientId(1)]);

        directory.add(RecipientId(2)).await;
        assert!(directory.is_active(RecipientId(2)).await);
    }

    #[tokio::test]
    async fn test_list_due_orders_and_limits() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let repo = InMemoryScheduledBroadcastRepository::new();
        for (id, offset_hours, enabled) in [
            (1, -1, true),
            (2, -3, true),
            (3, 1, true),
            (4, -5, false),
            (5, -2, true),
        ] {
            repo.insert(ScheduledBroadcast {
                id,
                kind: BroadcastKind::Text,
                body: format!("item {id}"),
                media_ref: None,
                render_mode: RenderMode::Plain,
                interval_hours: 6,
                enabled,
                last_sent_at: None,
                next_run_at: now + Duration::hours(offset_hours),
            })
            .await;
        }

        let due: Vec<i64> = repo.list_due(now, 50).await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(due, vec![2, 5, 1]);

        let limited: Vec<i64> = repo.list_due(now, 2).await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(limited, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_mark_sent_unknown_id_fails() {
        let repo = InMemoryScheduledBroadcastRepository::new();
        let now = Utc::now();
        assert!(repo.mark_sent(42, now, now).await.is_err());
    }
}
