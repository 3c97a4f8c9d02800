//! Pause step: a fixed durable delay.

use std::time::Duration;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::GameVar;

use crate::context::{StepContext, durable_sleep, get_var, set_var_to};

use super::require_f64;

#[derive(Debug, Clone)]
pub struct PauseStep {
    /// Seconds to pause for.
    pub seconds: f64,
}

fn done_var() -> GameVar<bool> {
    GameVar::step("done", false)
}

impl PauseStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `for` is missing or not a
    /// non-negative number of seconds.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let seconds = require_f64(
            config,
            "for",
            "a pause step must have a 'for' parameter specifying the number of seconds to pause",
        )?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(EngineError::script(
                "a pause step's 'for' duration must be a non-negative number of seconds",
            ));
        }
        Ok(Self { seconds })
    }

    pub(super) async fn run(&self, ctx: &dyn StepContext, id: StepId) -> Result<(), EngineError> {
        durable_sleep(ctx, id, "for", Duration::from_secs_f64(self.seconds)).await?;
        set_var_to(ctx, &done_var(), Some(id), true).await?;
        Ok(())
    }

    pub(super) fn is_complete(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<bool, EngineError> {
        get_var(ctx, &done_var(), Some(id))
    }
}
