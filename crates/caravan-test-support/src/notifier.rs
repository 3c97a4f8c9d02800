//! Test notifier — records every published event.

use std::sync::Mutex;

use async_trait::async_trait;
use caravan_core::ids::PlayerId;
use caravan_core::notify::{Notification, Notifier};

/// A notifier that records all published events for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(Vec<PlayerId>, Notification)>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all published `(recipients, event)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(Vec<PlayerId>, Notification)> {
        self.published.lock().unwrap().clone()
    }

    /// Returns just the published events, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<Notification> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, user_ids: &[PlayerId], event: &Notification) {
        self.published
            .lock()
            .unwrap()
            .push((user_ids.to_vec(), event.clone()));
    }
}
