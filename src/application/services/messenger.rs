use async_trait::async_trait;

use crate::domain::models::{Message, RecipientId};

/// Transport-level "send one message to one recipient".
///
/// Errors are classified by their rendered text, so implementations should
/// keep the transport's own error description in the message.
#[async_trait]
pub trait MessengerClient: Send + Sync {
    async fn send(&self, recipient: RecipientId, message: &Message) -> anyhow::Result<()>;
}
