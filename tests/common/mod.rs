//! Shared fixtures for the integration tests: in-memory adapters and a
//! messenger that records every send attempt.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use notifications::{
    application::{
        handlers::notification_manager::{ManagerConfig, ManagerRepositories, NotificationManager},
        services::{
            broadcaster::Broadcaster, composer::MessageComposer, i18n::Catalog,
            messenger::MessengerClient,
        },
    },
    config::NotificationSettings,
    domain::{
        events::DomainEvent,
        models::{Message, RecipientId},
    },
    infrastructure::repositories::in_memory::{
        InMemoryLanguageRepository, InMemoryPreferenceRepository, InMemoryRecipientDirectory,
    },
};

#[derive(Debug, Clone)]
pub struct Attempt {
    pub recipient: RecipientId,
    pub message: Message,
    pub started: Instant,
    pub ok: bool,
}

/// Succeeds unless a recipient has a scripted error. Each send takes
/// `latency` of (virtual) time.
#[derive(Default)]
pub struct RecordingClient {
    latency: Duration,
    failures: HashMap<RecipientId, &'static str>,
    attempts: Mutex<Vec<Attempt>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, recipient: i64, error: &'static str) -> Self {
        self.failures.insert(RecipientId(recipient), error);
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, recipient: i64) -> usize {
        self.attempts()
            .iter()
            .filter(|a| a.recipient == RecipientId(recipient))
            .count()
    }

    /// Successful deliveries only.
    pub fn delivered(&self) -> Vec<(RecipientId, Message)> {
        self.attempts()
            .into_iter()
            .filter(|a| a.ok)
            .map(|a| (a.recipient, a.message))
            .collect()
    }

    pub fn delivered_to(&self, recipient: i64) -> Vec<Message> {
        self.delivered()
            .into_iter()
            .filter(|(id, _)| *id == RecipientId(recipient))
            .map(|(_, message)| message)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessengerClient for RecordingClient {
    async fn send(&self, recipient: RecipientId, message: &Message) -> anyhow::Result<()> {
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failures.get(&recipient).copied();
        self.attempts.lock().unwrap().push(Attempt {
            recipient,
            message: message.clone(),
            started,
            ok: failure.is_none(),
        });
        match failure {
            Some(error) => Err(anyhow::anyhow!(error)),
            None => Ok(()),
        }
    }
}

pub fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<RecipientId> {
    range.map(RecipientId).collect()
}

pub struct Harness {
    pub manager: Arc<NotificationManager>,
    pub client: Arc<RecordingClient>,
    pub directory: Arc<InMemoryRecipientDirectory>,
    pub preferences: Arc<InMemoryPreferenceRepository>,
    pub languages: Arc<InMemoryLanguageRepository>,
}

pub const BATCH_DELAY: Duration = Duration::from_secs(3);

pub fn harness(
    recipients: std::ops::RangeInclusive<i64>,
    settings: NotificationSettings,
    client: RecordingClient,
) -> Harness {
    let directory = Arc::new(InMemoryRecipientDirectory::with_recipients(ids(recipients)));
    let preferences = Arc::new(InMemoryPreferenceRepository::new());
    let languages = Arc::new(InMemoryLanguageRepository::new());
    let client = Arc::new(client);

    let manager = manager_with(
        ManagerRepositories {
            preferences: preferences.clone(),
            directory: directory.clone(),
            languages: languages.clone(),
        },
        client.clone(),
        settings,
    );

    Harness {
        manager,
        client,
        directory,
        preferences,
        languages,
    }
}

pub fn manager_with(
    repos: ManagerRepositories,
    client: Arc<dyn MessengerClient>,
    settings: NotificationSettings,
) -> Arc<NotificationManager> {
    let composer = MessageComposer::new(
        Arc::new(Catalog::embedded("en").unwrap()),
        Arc::new(settings),
    );
    NotificationManager::new(
        repos,
        client,
        Broadcaster::default(),
        composer,
        ManagerConfig {
            batch_delay: BATCH_DELAY,
            default_language: "en".to_string(),
        },
    )
}

/// An event about attachment `code` of the MP5 in Battle Royale.
pub fn event(kind: &str, code: &str) -> DomainEvent {
    DomainEvent::from_payload(
        kind,
        &json!({
            "category": "smg",
            "weapon": "MP5",
            "code": code,
            "mode": "br",
            "name": "Silent",
            "old_name": "Loud",
            "new_name": "Silent",
            "old_code": "X1",
            "new_code": code,
        }),
    )
    .unwrap()
}
