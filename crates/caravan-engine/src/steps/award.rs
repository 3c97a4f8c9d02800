//! Saltine award step.
//!
//! Saltines are the in-fiction point currency. The all-time balance is
//! team-scoped; the per-game earned/possible counters are game-scoped so
//! a recap can show "12 of 20 possible this game".

use std::borrow::Cow;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::{GameVar, VarScope};

use crate::context::{StepContext, get_var, set_var, set_var_to};

use super::require_f64;

/// All-time saltines earned by the team.
pub const SALTINES_EARNED_ALL_TIME: GameVar<i64> = GameVar {
    key: Cow::Borrowed("saltines"),
    scope: VarScope::Team,
    default: 0,
};
/// All-time saltines the team has spent (e.g. on punchcards).
pub const SALTINES_SPENT: GameVar<i64> = GameVar {
    key: Cow::Borrowed("saltines_spent"),
    scope: VarScope::Team,
    default: 0,
};
/// Saltines earned during this game.
pub const SALTINES_EARNED_THIS_GAME: GameVar<i64> = GameVar {
    key: Cow::Borrowed("saltines_this_game"),
    scope: VarScope::Game,
    default: 0,
};
/// Saltines that could have been earned during this game.
pub const SALTINES_POSSIBLE_THIS_GAME: GameVar<i64> = GameVar {
    key: Cow::Borrowed("possible_saltines_this_game"),
    scope: VarScope::Game,
    default: 0,
};

/// A team's saltine balance, derived from its committed variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltinesStatus {
    pub balance: i64,
    pub earned: i64,
    pub spent: i64,
}

impl SaltinesStatus {
    /// Compute the balance from a team's committed `game_vars` blob.
    ///
    /// # Errors
    ///
    /// Fails if a stored counter does not decode as an integer.
    pub fn from_team_vars(team_vars: &VarMap) -> Result<Self, EngineError> {
        let earned = caravan_core::vars::decode_var(
            &SALTINES_EARNED_ALL_TIME,
            team_vars.get(SALTINES_EARNED_ALL_TIME.key.as_ref()),
        )?;
        let spent = caravan_core::vars::decode_var(
            &SALTINES_SPENT,
            team_vars.get(SALTINES_SPENT.key.as_ref()),
        )?;
        Ok(Self {
            balance: earned - spent,
            earned,
            spent,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AwardSaltinesStep {
    pub earned: i64,
    pub possible: i64,
}

fn has_run_var() -> GameVar<bool> {
    GameVar::step("hasRun", false)
}

impl AwardSaltinesStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `earned` or `possible` is missing
    /// or non-numeric, or if earned exceeds possible.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let earned = require_f64(
            config,
            "earned",
            "an award saltines step must have a numeric 'earned' parameter",
        )?;
        let possible = require_f64(
            config,
            "possible",
            "an award saltines step must have a numeric 'possible' parameter",
        )?;
        if earned > possible {
            return Err(EngineError::script(
                "Earned must be less than or equal to possible.",
            ));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self {
            earned: earned as i64,
            possible: possible as i64,
        })
    }

    /// Award the points exactly once. The has-run flag is written last,
    /// so a crash mid-award re-runs the step; the counters are only read
    /// under the row lock, and the flag guard means a completed award is
    /// never applied twice.
    pub(super) async fn run(&self, ctx: &dyn StepContext, id: StepId) -> Result<(), EngineError> {
        if get_var(ctx, &has_run_var(), Some(id))? {
            return Ok(());
        }
        let earned = self.earned;
        let possible = self.possible;
        set_var(ctx, &SALTINES_EARNED_ALL_TIME, None, move |n| n + earned).await?;
        set_var(ctx, &SALTINES_EARNED_THIS_GAME, None, move |n| n + earned).await?;
        set_var(ctx, &SALTINES_POSSIBLE_THIS_GAME, None, move |n| n + possible).await?;
        set_var_to(ctx, &has_run_var(), Some(id), true).await?;
        Ok(())
    }
}
