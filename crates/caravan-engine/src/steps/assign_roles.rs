//! Role assignment step.
//!
//! Partitions the current players into role groups sized by a fixed
//! table keyed on player count, shuffles group-to-player assignment, and
//! records the result durably. The exact player-id set used is stored
//! alongside, so a re-run with an unchanged roster is a no-op while a
//! changed roster (someone joined, a phone died and the script was
//! restarted) reshuffles.

use std::collections::BTreeSet;

use caravan_core::error::EngineError;
use caravan_core::ids::PlayerId;
use caravan_core::store::VarMap;
use caravan_core::vars::GameVar;

use crate::context::{StepContext, get_var, set_var_to};

/// Role groups by player count. A group is the set of role letters one
/// player carries, e.g. 'BDS'.
fn role_groups_for(num_players: usize) -> Option<&'static [&'static str]> {
    match num_players {
        2 => Some(&["IW", "BDS"]),
        3 => Some(&["W", "DI", "BS"]),
        4 => Some(&["W", "S", "I", "BD"]),
        5 => Some(&["W", "S", "I", "B", "D"]),
        _ => None,
    }
}

/// The player holding a given role letter, team-scoped so the assignment
/// outlives the game. Game code always reshuffles on a new game, so
/// nobody is stuck with the same role across scenarios.
pub fn role_var(role_letter: &str) -> GameVar<Option<PlayerId>> {
    GameVar::team(format!("role:{role_letter}"), None)
}

/// The player-id set roles were last shuffled for. Game-scoped on
/// purpose: a fresh game must always reshuffle.
fn shuffled_for_var() -> GameVar<Vec<PlayerId>> {
    GameVar::game("roles-shuffled", Vec::new())
}

#[derive(Debug, Clone)]
pub struct AssignRolesStep;

impl AssignRolesStep {
    /// No config.
    #[allow(clippy::unnecessary_wraps)]
    pub fn parse(_config: &VarMap) -> Result<Self, EngineError> {
        Ok(Self)
    }

    pub(super) async fn run(&self, ctx: &dyn StepContext) -> Result<(), EngineError> {
        if self.is_complete(ctx)? {
            return Ok(());
        }
        let player_ids: BTreeSet<PlayerId> = ctx.player_ids().into_iter().collect();
        let num_players = player_ids.len();
        let role_groups = role_groups_for(num_players).ok_or_else(|| {
            EngineError::script(format!("invalid number of players ({num_players})"))
        })?;

        // Insert each group at a random position; an unbiased shuffle
        // driven by the injected RNG.
        let mut shuffled: Vec<&str> = Vec::with_capacity(role_groups.len());
        for group in role_groups {
            let len = u32::try_from(shuffled.len()).unwrap_or(u32::MAX);
            let at = ctx.next_u32_range(0, len) as usize;
            shuffled.insert(at, group);
        }

        for player_id in &player_ids {
            // Counts match by construction of the tables.
            let Some(group) = shuffled.pop() else { break };
            for role_letter in group.chars() {
                set_var_to(ctx, &role_var(&role_letter.to_string()), None, Some(*player_id))
                    .await?;
            }
        }
        let roster: Vec<PlayerId> = player_ids.into_iter().collect();
        set_var_to(ctx, &shuffled_for_var(), None, roster).await?;
        Ok(())
    }

    /// Roles count as assigned only for exactly the current roster.
    pub(super) fn is_complete(&self, ctx: &dyn StepContext) -> Result<bool, EngineError> {
        let shuffled_for: BTreeSet<PlayerId> =
            get_var(ctx, &shuffled_for_var(), None)?.into_iter().collect();
        let current: BTreeSet<PlayerId> = ctx.player_ids().into_iter().collect();
        Ok(!shuffled_for.is_empty() && shuffled_for == current)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::mock::MockStepContext;
    use super::*;

    fn assigned_roles(ctx: &MockStepContext) -> HashMap<String, PlayerId> {
        let mut out = HashMap::new();
        for letter in ["W", "S", "I", "B", "D"] {
            if let Some(player) = get_var(ctx, &role_var(letter), None).unwrap() {
                out.insert(letter.to_owned(), player);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_every_role_letter_is_assigned_for_each_team_size() {
        for size in 2..=5 {
            let ctx = MockStepContext::new();
            ctx.set_player_ids((1..=size).collect());
            let step = AssignRolesStep;
            step.run(&ctx).await.unwrap();
            assert!(step.is_complete(&ctx).unwrap(), "size {size}");
            let roles = assigned_roles(&ctx);
            assert_eq!(roles.len(), 5, "size {size}: {roles:?}");
            for player in roles.values() {
                assert!((1..=size).contains(player), "size {size}: {roles:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_rerun_with_unchanged_roster_is_a_no_op() {
        let ctx = MockStepContext::new();
        ctx.set_player_ids(vec![7, 8, 9]);
        let step = AssignRolesStep;
        step.run(&ctx).await.unwrap();
        let before = assigned_roles(&ctx);
        // Reversed order must not count as a roster change.
        ctx.set_player_ids(vec![9, 8, 7]);
        step.run(&ctx).await.unwrap();
        assert_eq!(assigned_roles(&ctx), before);
    }

    #[tokio::test]
    async fn test_changed_roster_reshuffles() {
        let ctx = MockStepContext::new();
        ctx.set_player_ids(vec![7, 8]);
        let step = AssignRolesStep;
        step.run(&ctx).await.unwrap();
        ctx.set_player_ids(vec![7, 8, 9]);
        assert!(!step.is_complete(&ctx).unwrap());
        step.run(&ctx).await.unwrap();
        assert!(step.is_complete(&ctx).unwrap());
        let roles = assigned_roles(&ctx);
        for player in roles.values() {
            assert!([7, 8, 9].contains(player), "{roles:?}");
        }
    }

    #[tokio::test]
    async fn test_unsupported_player_count_fails() {
        let ctx = MockStepContext::new();
        ctx.set_player_ids(vec![1]);
        assert!(AssignRolesStep.run(&ctx).await.is_err());
    }
}
