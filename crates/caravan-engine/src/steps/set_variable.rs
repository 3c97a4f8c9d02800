//! Set step: writes an evaluated expression to a team or game variable.
//!
//! ```yaml
//! - step: set
//!   key: story
//!   scope: team
//!   to: VAR('story', 0) + 1
//! ```

use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::{GameVar, VarScope};

use crate::context::{StepContext, get_var, set_var_to};

use super::require_str;

#[derive(Debug, Clone)]
pub struct SetVariableStep {
    /// Name of the variable to set.
    pub key: String,
    /// Scope the variable lives in, team or game.
    pub scope: VarScope,
    /// Expression evaluated at run time to produce the value.
    pub to: String,
}

fn has_run_var() -> GameVar<bool> {
    GameVar::step("hasRun", false)
}

impl SetVariableStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `key` or `to` is missing, or
    /// `scope` is not `team` or `game`.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let key = require_str(
            config,
            "key",
            "a 'set' step must have a 'key' parameter specifying the variable name",
        )?;
        let to = require_str(
            config,
            "to",
            "a 'set' step must have a 'to' parameter specifying the value expression",
        )?;
        let scope = match config.get("scope") {
            Some(Value::String(s)) if s == "team" => VarScope::Team,
            Some(Value::String(s)) if s == "game" => VarScope::Game,
            _ => {
                return Err(EngineError::script(
                    "a 'set' step must have 'scope' set to either 'game' or 'team'",
                ));
            }
        };
        Ok(Self { key, scope, to })
    }

    /// Evaluate the expression and write the result, exactly once per
    /// game. The expression is evaluated against variable state at run
    /// time, not at script load.
    pub(super) async fn run(&self, ctx: &dyn StepContext, id: StepId) -> Result<(), EngineError> {
        if get_var(ctx, &has_run_var(), Some(id))? {
            return Ok(());
        }
        let value = ctx.eval_expression(&self.to)?.to_json();
        let var: GameVar<Value> = GameVar {
            key: self.key.clone().into(),
            scope: self.scope,
            default: Value::Null,
        };
        set_var_to(ctx, &var, None, value).await?;
        set_var_to(ctx, &has_run_var(), Some(id), true).await?;
        Ok(())
    }

    pub(super) fn is_complete(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<bool, EngineError> {
        get_var(ctx, &has_run_var(), Some(id))
    }
}
