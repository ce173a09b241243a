use crate::domain::{models::RecipientId, repositories::RecipientDirectory};

pub mod notification_manager;
pub mod notification_scheduler;

/// Drops recipients the transport reported as gone for good. Returns how
/// many were actually removed.
pub(crate) async fn prune_unreachable(
    directory: &dyn RecipientDirectory,
    recipients: &[RecipientId],
) -> usize {
    let mut removed = 0;
    for recipient in recipients {
        match directory.remove(*recipient).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(recipient = %recipient, error = %err, "Failed to remove recipient");
            }
        }
    }
    if removed > 0 {
        tracing::info!(removed, "Removed unreachable recipients");
    }
    removed
}
