use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::events::EventKind;

/// A recipient's stored notification settings.
///
/// A missing flag in `event_flags` means the kind is wanted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientPreference {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "modes", default = "default_variants")]
    pub variants: HashSet<String>,
    #[serde(rename = "events", default)]
    pub event_flags: HashMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

fn default_variants() -> HashSet<String> {
    ["br", "mp"].into_iter().map(String::from).collect()
}

impl RecipientPreference {
    /// Settings shown to a recipient who has never saved any.
    pub fn initial() -> Self {
        let event_flags = [
            (EventKind::AddAttachment, true),
            (EventKind::EditName, true),
            (EventKind::EditImage, false),
            (EventKind::EditCode, true),
            (EventKind::DeleteAttachment, false),
            (EventKind::TopSet, true),
            (EventKind::TopAdded, true),
            (EventKind::TopRemoved, false),
        ]
        .into_iter()
        .map(|(kind, on)| (kind.as_str().to_string(), on))
        .collect();

        Self {
            enabled: true,
            variants: default_variants(),
            event_flags,
        }
    }

    pub fn flag(&self, kind: EventKind) -> bool {
        self.event_flags.get(kind.as_str()).copied().unwrap_or(true)
    }

    /// True when at least one of `kinds` is wanted for `variant`.
    pub fn wants(&self, kinds: &[EventKind], variant: &str) -> bool {
        self.enabled && self.variants.contains(variant) && kinds.iter().any(|k| self.flag(*k))
    }
}

impl Default for RecipientPreference {
    fn default() -> Self {
        Self::initial()
    }
}
