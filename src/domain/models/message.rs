use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Plain,
    #[default]
    Markdown,
    MarkdownV2,
    Html,
}

impl RenderMode {
    pub fn is_rich(&self) -> bool {
        !matches!(self, RenderMode::Plain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Plain => "plain",
            RenderMode::Markdown => "markdown",
            RenderMode::MarkdownV2 => "markdown_v2",
            RenderMode::Html => "html",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plain" => Some(RenderMode::Plain),
            "markdown" => Some(RenderMode::Markdown),
            "markdownv2" | "markdown_v2" => Some(RenderMode::MarkdownV2),
            "html" => Some(RenderMode::Html),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub action_ref: String,
}

/// One outgoing message, identical for every recipient of a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub render_mode: RenderMode,
    pub media_ref: Option<String>,
    pub action: Option<ActionButton>,
}

impl Message {
    pub fn text(text: impl Into<String>, render_mode: RenderMode) -> Self {
        Self {
            text: text.into(),
            render_mode,
            media_ref: None,
            action: None,
        }
    }

    pub fn media(
        media_ref: impl Into<String>,
        caption: impl Into<String>,
        render_mode: RenderMode,
    ) -> Self {
        Self {
            text: caption.into(),
            render_mode,
            media_ref: Some(media_ref.into()),
            action: None,
        }
    }

    pub fn with_action(mut self, label: impl Into<String>, action_ref: impl Into<String>) -> Self {
        self.action = Some(ActionButton {
            label: label.into(),
            action_ref: action_ref.into(),
        });
        self
    }

    pub fn rich_formatting(&self) -> bool {
        self.render_mode.is_rich()
    }

    pub fn as_plain(&self) -> Self {
        Self {
            render_mode: RenderMode::Plain,
            ..self.clone()
        }
    }
}
