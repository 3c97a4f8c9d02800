//! Finish-line step: the end-of-scenario marker.
//!
//! Reaching it flips the in-memory game status to review mode; the
//! script keeps running so epilogue steps (recaps, awards) can still
//! execute before the game row is finished.

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use crate::ui::StepUi;

#[derive(Debug, Clone)]
pub struct FinishLineStep;

impl FinishLineStep {
    /// No config.
    #[allow(clippy::unnecessary_wraps)]
    pub fn parse(_config: &VarMap) -> Result<Self, EngineError> {
        Ok(Self)
    }

    pub(super) fn ui_state(&self, id: StepId) -> StepUi {
        StepUi::FinishLine { step_id: id }
    }
}
