use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

const DEFAULT_VARIANT: &str = "br";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AddAttachment,
    EditName,
    EditCode,
    EditImage,
    DeleteAttachment,
    TopAdded,
    TopRemoved,
    TopSet,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::AddAttachment,
        EventKind::EditName,
        EventKind::EditCode,
        EventKind::EditImage,
        EventKind::DeleteAttachment,
        EventKind::TopAdded,
        EventKind::TopRemoved,
        EventKind::TopSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AddAttachment => "add_attachment",
            EventKind::EditName => "edit_name",
            EventKind::EditCode => "edit_code",
            EventKind::EditImage => "edit_image",
            EventKind::DeleteAttachment => "delete_attachment",
            EventKind::TopAdded => "top_added",
            EventKind::TopRemoved => "top_removed",
            EventKind::TopSet => "top_set",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The attachment an event is about. Events with equal subjects coalesce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventSubject {
    pub category: String,
    pub entity: String,
    pub code: String,
    pub variant: String,
    pub display_name: String,
}

impl EventSubject {
    pub fn group_key(&self) -> String {
        format!(
            "{}__{}__{}__{}",
            self.category, self.entity, self.code, self.variant
        )
    }

    /// Callback reference carried by the "view" button of a notification.
    pub fn action_ref(&self) -> String {
        format!(
            "attm__{}__{}__{}__{}",
            self.category, self.entity, self.code, self.variant
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "detail", rename_all = "snake_case")]
pub enum EventDetail {
    Plain,
    NameChanged { old_name: String, new_name: String },
    CodeChanged { old_code: String, new_code: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainEvent {
    kind: EventKind,
    subject: EventSubject,
    detail: EventDetail,
}

impl DomainEvent {
    pub fn new(
        kind: EventKind,
        subject: EventSubject,
        detail: EventDetail,
    ) -> Result<Self, DomainError> {
        match (kind, &detail) {
            (EventKind::EditName, EventDetail::NameChanged { .. })
            | (EventKind::EditCode, EventDetail::CodeChanged { .. }) => {}
            (EventKind::EditName | EventKind::EditCode, _) => {
                return Err(DomainError::Validation(format!(
                    "{kind} requires its before/after values"
                )));
            }
            (_, EventDetail::Plain) => {}
            (_, _) => {
                return Err(DomainError::Validation(format!(
                    "{kind} does not carry before/after values"
                )));
            }
        }

        if subject.variant.trim().is_empty() {
            return Err(DomainError::Validation("variant must not be empty".into()));
        }

        Ok(Self {
            kind,
            subject,
            detail,
        })
    }

    /// Builds an event from the loosely-typed map shape used by callers that
    /// emit JSON (`category`, `weapon`, `code`, `mode`, `name`, ...).
    pub fn from_payload(kind: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        let kind =
            EventKind::from_str(kind).ok_or_else(|| DomainError::UnknownEventKind(kind.into()))?;
        let raw: RawPayload = serde_json::from_value(payload.clone())
            .map_err(|err| DomainError::Validation(format!("malformed payload: {err}")))?;

        let detail = match kind {
            EventKind::EditName => EventDetail::NameChanged {
                old_name: raw.old_name.unwrap_or_default(),
                new_name: raw.new_name.unwrap_or_default(),
            },
            EventKind::EditCode => EventDetail::CodeChanged {
                old_code: raw.old_code.unwrap_or_default(),
                new_code: raw.new_code.unwrap_or_default(),
            },
            _ => EventDetail::Plain,
        };

        let subject = EventSubject {
            category: raw.category,
            entity: raw.entity,
            code: raw.code,
            variant: raw.variant.unwrap_or_else(|| DEFAULT_VARIANT.to_string()),
            display_name: raw.name,
        };

        Self::new(kind, subject, detail)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn subject(&self) -> &EventSubject {
        &self.subject
    }

    pub fn detail(&self) -> &EventDetail {
        &self.detail
    }

    pub fn group_key(&self) -> String {
        self.subject.group_key()
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    category: String,
    #[serde(default, alias = "weapon")]
    entity: String,
    #[serde(default)]
    code: String,
    #[serde(default, alias = "mode")]
    variant: Option<String>,
    #[serde(default)]
    name: String,
    old_name: Option<String>,
    new_name: Option<String>,
    old_code: Option<String>,
    new_code: Option<String>,
}
