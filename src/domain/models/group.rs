use chrono::{DateTime, Utc};

use crate::domain::events::{DomainEvent, EventKind, EventSubject};

/// Events about one attachment that arrived within a debounce window.
#[derive(Debug, Clone)]
pub struct NotificationGroup {
    pub key: String,
    pub base_info: EventSubject,
    pub events: Vec<DomainEvent>,
    pub created_at: DateTime<Utc>,
}

impl NotificationGroup {
    /// Starts a group whose base info is snapshotted from `first`.
    pub fn new(first: DomainEvent) -> Self {
        Self {
            key: first.group_key(),
            base_info: first.subject().clone(),
            events: vec![first],
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    /// Distinct kinds present, in first-seen order.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        let mut kinds = Vec::with_capacity(self.events.len());
        for event in &self.events {
            if !kinds.contains(&event.kind()) {
                kinds.push(event.kind());
            }
        }
        kinds
    }
}
