use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    application::services::messenger::MessengerClient,
    domain::models::{Message, RecipientId, RenderMode},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bot API transport. Failures are worded so the failure classifier can
/// tell unreachable chats from temporary trouble.
pub struct TelegramClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Arc<Self>> {
        let http = Client::builder()
            .user_agent("notifications/telegram")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build telegram client")?;
        Ok(Arc::new(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }))
    }

    fn build_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }
}

/// Bot API method and JSON body for one message.
fn build_request(recipient: RecipientId, message: &Message) -> (&'static str, Value) {
    let (method, mut body) = match &message.media_ref {
        Some(media_ref) => (
            "sendPhoto",
            json!({ "chat_id": recipient.0, "photo": media_ref, "caption": message.text }),
        ),
        None => (
            "sendMessage",
            json!({ "chat_id": recipient.0, "text": message.text }),
        ),
    };

    if let Some(parse_mode) = parse_mode(message.render_mode) {
        body["parse_mode"] = json!(parse_mode);
    }
    if let Some(action) = &message.action {
        body["reply_markup"] = json!({
            "inline_keyboard": [[{ "text": action.label, "callback_data": action.action_ref }]]
        });
    }
    (method, body)
}

fn parse_mode(mode: RenderMode) -> Option<&'static str> {
    match mode {
        RenderMode::Plain => None,
        RenderMode::Markdown => Some("Markdown"),
        RenderMode::MarkdownV2 => Some("MarkdownV2"),
        RenderMode::Html => Some("HTML"),
    }
}

fn describe_transport_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow::anyhow!("timeout: {err}")
    } else if err.is_connect() || err.is_request() {
        anyhow::anyhow!("network error: {err}")
    } else {
        anyhow::Error::new(err)
    }
}

#[async_trait]
impl MessengerClient for TelegramClient {
    async fn send(&self, recipient: RecipientId, message: &Message) -> anyhow::Result<()> {
        let (method, body) = build_request(recipient, message);
        let response = self
            .http
            .post(self.build_url(method))
            .json(&body)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = response.status();
        let payload: TelegramResponse = response
            .json()
            .await
            .map_err(describe_transport_error)?;
        if !payload.ok {
            anyhow::bail!(
                "telegram api error {}: {}",
                payload.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                payload
                    .description
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    error_code: Option<i64>,
    description: Option<String>,
}
