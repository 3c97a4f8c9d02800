//! Notification boundary.
//!
//! Fire-and-forget fan-out of typed events to all currently connected
//! session handles for a set of users. Delivery is at-most-once from the
//! engine's perspective; the strictly increasing `ui_update_seq_id`
//! carried by UI updates is the client's compensating control — any gap
//! means a lost update and forces a full state refresh.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::ids::{PlayerId, ScenarioId};

/// A typed event pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// One step's UI projection changed.
    #[serde(rename = "GAME_UI_UPDATE", rename_all = "camelCase")]
    GameUiUpdate {
        /// Strictly increasing, gap-free per game.
        ui_update_seq_id: u64,
        /// Index of the changed step among the steps seen so far.
        step_index: usize,
        /// The step's new UI projection; None if nothing renders yet.
        new_step_ui: Option<Value>,
    },

    /// A game started or ended for the team.
    #[serde(rename = "GAME_STATUS_CHANGED", rename_all = "camelCase")]
    GameStatusChanged {
        /// The scenario in play (0 when no game is active).
        scenario_id: ScenarioId,
        /// The scenario's display name (empty when no game is active).
        scenario_name: String,
        /// Whether a game is now active.
        is_active: bool,
    },
}

/// Delivers events to all connected sessions of the given users.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish `event` to every listed user. Best effort; the engine
    /// never retries.
    async fn publish(&self, user_ids: &[PlayerId], event: &Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_update_serializes_with_stable_field_names() {
        let event = Notification::GameUiUpdate {
            ui_update_seq_id: 3,
            step_index: 1,
            new_step_ui: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "GAME_UI_UPDATE");
        assert_eq!(json["uiUpdateSeqId"], 3);
        assert_eq!(json["stepIndex"], 1);
        assert!(json["newStepUi"].is_null());
    }

    #[test]
    fn test_status_change_serializes_with_stable_field_names() {
        let event = Notification::GameStatusChanged {
            scenario_id: 7,
            scenario_name: "The Crossing".to_owned(),
            is_active: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "GAME_STATUS_CHANGED");
        assert_eq!(json["scenarioId"], 7);
        assert_eq!(json["scenarioName"], "The Crossing");
        assert_eq!(json["isActive"], true);
    }
}
