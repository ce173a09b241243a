use std::sync::Arc;

use crate::domain::{
    errors::DomainError,
    events::EventKind,
    models::{RecipientId, RecipientPreference},
    repositories::PreferenceRepository,
};

/// Reads and flips a recipient's notification switches. Every toggle
/// persists the whole record and returns it.
pub struct PreferencesUseCase {
    repo: Arc<dyn PreferenceRepository>,
}

impl PreferencesUseCase {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }

    pub async fn get(&self, recipient: RecipientId) -> anyhow::Result<RecipientPreference> {
        Ok(self
            .repo
            .get_preference(recipient)
            .await?
            .unwrap_or_else(RecipientPreference::initial))
    }

    pub async fn toggle_enabled(
        &self,
        recipient: RecipientId,
    ) -> anyhow::Result<RecipientPreference> {
        let mut pref = self.get(recipient).await?;
        pref.enabled = !pref.enabled;
        self.save(recipient, pref).await
    }

    pub async fn toggle_event(
        &self,
        recipient: RecipientId,
        kind: EventKind,
    ) -> anyhow::Result<RecipientPreference> {
        let mut pref = self.get(recipient).await?;
        let current = pref.flag(kind);
        pref.event_flags.insert(kind.as_str().to_string(), !current);
        self.save(recipient, pref).await
    }

    pub async fn toggle_variant(
        &self,
        recipient: RecipientId,
        variant: &str,
    ) -> anyhow::Result<RecipientPreference> {
        let variant = variant.trim();
        if variant.is_empty() {
            return Err(DomainError::Validation("variant must not be empty".into()).into());
        }

        let mut pref = self.get(recipient).await?;
        if !pref.variants.remove(variant) {
            pref.variants.insert(variant.to_string());
        }
        self.save(recipient, pref).await
    }

    async fn save(
        &self,
        recipient: RecipientId,
        pref: RecipientPreference,
    ) -> anyhow::Result<RecipientPreference> {
        self.repo.save_preference(recipient, &pref).await?;
        tracing::debug!(recipient = %recipient, enabled = pref.enabled, "Preferences updated");
        Ok(pref)
    }
}
