//! Goto step: a forward jump to a named target.

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use super::require_str;

/// Control-flow marker. Always complete; when the manager advances past
/// it, the pointer jumps to the linked target instead of the next step.
#[derive(Debug, Clone)]
pub struct GotoStep {
    /// Target name to jump to.
    pub name: String,
    /// Resolved target step id, filled in by [`super::build_steps`].
    pub target: Option<StepId>,
}

impl GotoStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `name` is missing.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        Ok(Self {
            name: require_str(
                config,
                "name",
                "a goto step must have a 'name' parameter naming its target",
            )?,
            target: None,
        })
    }
}
