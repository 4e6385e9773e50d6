use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;

/// Push/email delivery to a user.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: Uuid, title: &str, body: &str) -> Result<(), AppError>;
}

/// Writes notifications to the log instead of a push provider.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, user_id: Uuid, title: &str, body: &str) -> Result<(), AppError> {
        info!(user_id = %user_id, title, body, "notification sent");
        Ok(())
    }
}

/// Sends in the background; failures are logged and go no further.
pub fn dispatch(sink: &Arc<dyn NotificationSink>, user_id: Uuid, title: String, body: String) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        if let Err(err) = sink.notify(user_id, &title, &body).await {
            warn!(user_id = %user_id, error = %err, "notification failed");
        }
    });
}

pub fn order_update(sink: &Arc<dyn NotificationSink>, user_id: Uuid, order_id: Uuid, status: &str) {
    let short_id: String = order_id.simple().to_string().chars().take(6).collect();
    dispatch(
        sink,
        user_id,
        format!("Order Update #{short_id}"),
        format!("Your order status is now: {status}"),
    );
}
