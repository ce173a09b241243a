use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, RenderMode};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    Text,
    Media,
}

impl BroadcastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::Text => "text",
            BroadcastKind::Media => "photo",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "text" => Some(BroadcastKind::Text),
            "photo" | "media" => Some(BroadcastKind::Media),
            _ => None,
        }
    }
}

/// A periodic broadcast to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledBroadcast {
    pub id: i64,
    pub kind: BroadcastKind,
    pub body: String,
    pub media_ref: Option<String>,
    pub render_mode: RenderMode,
    pub interval_hours: u32,
    pub enabled: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
}

impl ScheduledBroadcast {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at <= now
    }

    /// Next run after a dispatch at `sent_at`. Intervals below one hour are
    /// treated as one hour so the schedule always moves forward.
    pub fn next_run_after(&self, sent_at: DateTime<Utc>) -> DateTime<Utc> {
        sent_at + Duration::hours(i64::from(self.interval_hours.max(1)))
    }

    pub fn to_message(&self) -> Message {
        match (&self.kind, &self.media_ref) {
            (BroadcastKind::Media, Some(media_ref)) => {
                Message::media(media_ref.clone(), self.body.clone(), self.render_mode)
            }
            _ => Message::text(self.body.clone(), self.render_mode),
        }
    }
}
