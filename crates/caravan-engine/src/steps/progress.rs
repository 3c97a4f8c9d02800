//! Progress step: a percentage marker with a message.

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use crate::ui::StepUi;

use super::{require_f64, require_str};

#[derive(Debug, Clone)]
pub struct ProgressStep {
    pub message_html: String,
    pub percentage: f64,
}

impl ProgressStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `message` or `percentage` is
    /// missing, or the percentage is outside 0..=100.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let message_html = require_str(
            config,
            "message",
            "a progress step must have a 'message' parameter",
        )?;
        let percentage = require_f64(
            config,
            "percentage",
            "a progress step must have a numeric 'percentage' parameter",
        )?;
        if !(0.0..=100.0).contains(&percentage) {
            return Err(EngineError::script(
                "a progress step's percentage must be between 0 and 100",
            ));
        }
        Ok(Self {
            message_html,
            percentage,
        })
    }

    pub(super) fn ui_state(&self, id: StepId) -> StepUi {
        StepUi::Progress {
            step_id: id,
            message_html: self.message_html.clone(),
            percentage: self.percentage,
        }
    }
}
