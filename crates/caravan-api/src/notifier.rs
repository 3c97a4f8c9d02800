//! Notification sink for the API process.

use async_trait::async_trait;
use tracing::{error, info};

use caravan_core::ids::PlayerId;
use caravan_core::notify::{Notification, Notifier};

/// Publishes engine notifications to the process log.
///
/// The realtime push channel to clients is owned by a separate gateway
/// process that tails these records; the engine itself never retries a
/// delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, user_ids: &[PlayerId], event: &Notification) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(?user_ids, payload, "notification published"),
            Err(e) => error!(error = %e, "failed to serialize notification"),
        }
    }
}
