//! The closed set of script step types.
//!
//! Each step variant owns its config validation, UI projection,
//! completion predicate, and response handling. Dispatch is a tagged
//! union over the variants, so adding a step type is a compile-checked
//! change, and an unknown tag in a script is a load-time error.
//!
//! Every step's `run()` must be safe to invoke repeatedly: all effectful
//! actions are guarded by durable variables (has-run flags, revealed
//! counters, sleep deadlines), so a process restart re-runs the current
//! step without duplicating side effects.

mod assign_roles;
mod award;
mod bulletin;
mod choice;
mod finish_line;
mod free_response;
mod goto_step;
mod map;
mod message;
#[cfg(test)]
pub(crate) mod mock;
mod pause;
mod progress;
mod set_variable;
mod target;

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;

use crate::context::StepContext;
use crate::ui::StepUi;

pub use assign_roles::{AssignRolesStep, role_var};
pub use award::{
    AwardSaltinesStep, SALTINES_EARNED_ALL_TIME, SALTINES_EARNED_THIS_GAME,
    SALTINES_POSSIBLE_THIS_GAME, SALTINES_SPENT, SaltinesStatus,
};
pub use bulletin::BulletinStep;
pub use choice::MultipleChoiceStep;
pub use finish_line::FinishLineStep;
pub use free_response::FreeResponseStep;
pub use goto_step::GotoStep;
pub use map::MapStep;
pub use message::MessageStep;
pub use pause::PauseStep;
pub use progress::ProgressStep;
pub use set_variable::SetVariableStep;
pub use target::TargetStep;

/// A user response routed to the current step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    /// Free-text value, for free-response steps.
    #[serde(default)]
    pub value: Option<String>,
    /// Selected choice id, for multiple-choice steps.
    #[serde(default)]
    pub choice_id: Option<String>,
}

/// Step type dispatch.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Timed message reveal.
    Message(MessageStep),
    /// Free-text prompt.
    FreeResponse(FreeResponseStep),
    /// Multiple-choice prompt.
    MultipleChoice(MultipleChoiceStep),
    /// Fixed durable delay.
    Pause(PauseStep),
    /// Forward jump marker.
    Goto(GotoStep),
    /// Jump destination marker.
    Target(TargetStep),
    /// Deterministic role partition.
    AssignRoles(AssignRolesStep),
    /// Point award.
    AwardSaltines(AwardSaltinesStep),
    /// Fixed HTML bulletin.
    Bulletin(BulletinStep),
    /// Expression-driven variable write.
    SetVariable(SetVariableStep),
    /// Progress marker.
    Progress(ProgressStep),
    /// Map pin.
    Map(MapStep),
    /// End-of-scenario marker.
    FinishLine(FinishLineStep),
}

/// One executable unit of a script.
#[derive(Debug, Clone)]
pub struct Step {
    /// Step id: script index × 10.
    pub id: StepId,
    /// Optional guard expression; a falsy result skips this step.
    pub if_condition: Option<String>,
    /// The typed variant.
    pub kind: StepKind,
}

impl Step {
    /// Pure projection of current variable state into a client-facing
    /// shape, or None if nothing should render yet.
    ///
    /// # Errors
    ///
    /// Fails only if stored variable state does not decode.
    pub fn ui_state(&self, ctx: &dyn StepContext) -> Result<Option<StepUi>, EngineError> {
        match &self.kind {
            StepKind::Message(s) => s.ui_state(ctx, self.id),
            StepKind::FreeResponse(s) => s.ui_state(ctx, self.id),
            StepKind::MultipleChoice(s) => s.ui_state(ctx, self.id),
            StepKind::Bulletin(s) => Ok(Some(s.ui_state(self.id))),
            StepKind::Progress(s) => Ok(Some(s.ui_state(self.id))),
            StepKind::Map(s) => Ok(Some(s.ui_state(self.id))),
            StepKind::FinishLine(s) => Ok(Some(s.ui_state(self.id))),
            StepKind::Pause(_)
            | StepKind::Goto(_)
            | StepKind::Target(_)
            | StepKind::AssignRoles(_)
            | StepKind::AwardSaltines(_)
            | StepKind::SetVariable(_) => Ok(None),
        }
    }

    /// Whether the team should advance past this step. Only changes
    /// during `run()` or `handle_response()`; if it changed anywhere
    /// else the game could get stuck and never advance.
    ///
    /// # Errors
    ///
    /// Fails only if stored variable state does not decode.
    pub fn is_complete(&self, ctx: &dyn StepContext) -> Result<bool, EngineError> {
        match &self.kind {
            StepKind::Message(s) => s.is_complete(ctx, self.id),
            StepKind::FreeResponse(s) => s.is_complete(ctx, self.id),
            StepKind::MultipleChoice(s) => s.is_complete(ctx),
            StepKind::Pause(s) => s.is_complete(ctx, self.id),
            StepKind::AssignRoles(s) => s.is_complete(ctx),
            StepKind::SetVariable(s) => s.is_complete(ctx, self.id),
            StepKind::Goto(_)
            | StepKind::Target(_)
            | StepKind::AwardSaltines(_)
            | StepKind::Bulletin(_)
            | StepKind::Progress(_)
            | StepKind::Map(_)
            | StepKind::FinishLine(_) => Ok(true),
        }
    }

    /// Run this step. Normally called once per game, but must be robust
    /// to being killed and run again after a server restart.
    ///
    /// # Errors
    ///
    /// Propagates variable-write and evaluation failures; never
    /// swallowed here.
    pub async fn run(&self, ctx: &dyn StepContext) -> Result<(), EngineError> {
        match &self.kind {
            StepKind::Message(s) => s.run(ctx, self.id).await,
            StepKind::Pause(s) => s.run(ctx, self.id).await,
            StepKind::AssignRoles(s) => s.run(ctx).await,
            StepKind::AwardSaltines(s) => s.run(ctx, self.id).await,
            StepKind::SetVariable(s) => s.run(ctx, self.id).await,
            StepKind::FreeResponse(_)
            | StepKind::MultipleChoice(_)
            | StepKind::Goto(_)
            | StepKind::Target(_)
            | StepKind::Bulletin(_)
            | StepKind::Progress(_)
            | StepKind::Map(_)
            | StepKind::FinishLine(_) => Ok(()),
        }
    }

    /// Handle input from the user while this step is active.
    ///
    /// # Errors
    ///
    /// Returns a user-facing error if the step is already complete, the
    /// input is invalid, or the step takes no input at all.
    pub async fn handle_response(
        &self,
        ctx: &dyn StepContext,
        data: &StepResponse,
    ) -> Result<(), EngineError> {
        if self.is_complete(ctx)? {
            return Err(EngineError::user("Choice already made."));
        }
        match &self.kind {
            StepKind::FreeResponse(s) => s.handle_response(ctx, self.id, data).await,
            StepKind::MultipleChoice(s) => s.handle_response(ctx, self.id, data).await,
            _ => Err(EngineError::user("Cannot submit data to this step.")),
        }
    }
}

/// Parse one raw script entry into a step.
///
/// # Errors
///
/// Returns `EngineError::Script` for a missing/unknown `step` tag or
/// invalid config.
pub fn parse_step(entry: &VarMap, id: StepId) -> Result<Step, EngineError> {
    let mut config = entry.clone();
    let tag = match config.remove("step") {
        Some(Value::String(tag)) => tag,
        _ => {
            return Err(EngineError::script(
                "step entry is missing its 'step' type tag",
            ));
        }
    };
    let if_condition = match config.remove("if") {
        None => None,
        Some(Value::String(expr)) => Some(expr),
        Some(_) => {
            return Err(EngineError::script(format!(
                "the 'if' guard on a '{tag}' step must be an expression string"
            )));
        }
    };
    let kind = match tag.as_str() {
        "message" => StepKind::Message(MessageStep::parse(&config)?),
        "free response" => StepKind::FreeResponse(FreeResponseStep::parse(&config)?),
        "choice" => StepKind::MultipleChoice(MultipleChoiceStep::parse(&config)?),
        "pause" => StepKind::Pause(PauseStep::parse(&config)?),
        "goto" => StepKind::Goto(GotoStep::parse(&config)?),
        "target" => StepKind::Target(TargetStep::parse(&config, if_condition.is_some())?),
        "assign roles" => StepKind::AssignRoles(AssignRolesStep::parse(&config)?),
        "award saltines" => StepKind::AwardSaltines(AwardSaltinesStep::parse(&config)?),
        "bulletin" => StepKind::Bulletin(BulletinStep::parse(&config)?),
        "set" => StepKind::SetVariable(SetVariableStep::parse(&config)?),
        "progress" => StepKind::Progress(ProgressStep::parse(&config)?),
        "map" => StepKind::Map(MapStep::parse(&config)?),
        "finish line" => StepKind::FinishLine(FinishLineStep::parse(&config)?),
        other => {
            return Err(EngineError::script(format!(
                "unable to load step with step type \"{other}\""
            )));
        }
    };
    Ok(Step {
        id,
        if_condition,
        kind,
    })
}

/// Parse a whole script's entries into the ordered step map and link
/// goto steps to their targets.
///
/// # Errors
///
/// Returns `EngineError::Script` for any invalid step config, duplicate
/// target names, a goto naming an unknown target, or a backward jump.
pub fn build_steps(entries: &[VarMap]) -> Result<BTreeMap<StepId, Step>, EngineError> {
    let mut steps = BTreeMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        // Index × 10, leaving room for future insertion between steps.
        let id = i64::try_from(idx)
            .map_err(|_| EngineError::script("script has too many steps"))?
            * 10;
        steps.insert(id, parse_step(entry, id)?);
    }

    let mut targets: HashMap<String, StepId> = HashMap::new();
    for step in steps.values() {
        if let StepKind::Target(target) = &step.kind {
            if targets.insert(target.name.clone(), step.id).is_some() {
                return Err(EngineError::script(format!(
                    "duplicate target name \"{}\"",
                    target.name
                )));
            }
        }
    }
    for step in steps.values_mut() {
        if let StepKind::Goto(goto) = &mut step.kind {
            let target_id = *targets.get(&goto.name).ok_or_else(|| {
                EngineError::script(format!(
                    "goto step references unknown target \"{}\"",
                    goto.name
                ))
            })?;
            // Only forward jumps are supported; a backward jump would
            // revisit seen steps and loop forever.
            if target_id <= step.id {
                return Err(EngineError::script(format!(
                    "goto \"{}\" may only jump forward in the script",
                    goto.name
                )));
            }
            goto.target = Some(target_id);
        }
    }
    Ok(steps)
}

/// Required string config field.
pub(crate) fn require_str(config: &VarMap, key: &str, what: &str) -> Result<String, EngineError> {
    match config.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(EngineError::script(what.to_owned())),
    }
}

/// Required numeric config field.
pub(crate) fn require_f64(config: &VarMap, key: &str, what: &str) -> Result<f64, EngineError> {
    config
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| EngineError::script(what.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(yaml: &str) -> VarMap {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn entries(yaml: &str) -> Vec<VarMap> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_unknown_step_tag_is_a_script_error() {
        let err = parse_step(&entry("step: teleport\n"), 0).unwrap_err();
        assert!(err.to_string().contains("teleport"), "{err}");
    }

    #[test]
    fn test_missing_step_tag_is_a_script_error() {
        assert!(parse_step(&entry("messages: [hi]\n"), 0).is_err());
    }

    #[test]
    fn test_step_ids_are_index_times_ten() {
        let steps = build_steps(&entries(
            "- step: bulletin\n  html: a\n- step: bulletin\n  html: b\n- step: bulletin\n  html: c\n",
        ))
        .unwrap();
        let ids: Vec<StepId> = steps.keys().copied().collect();
        assert_eq!(ids, vec![0, 10, 20]);
    }

    #[test]
    fn test_goto_links_to_forward_target() {
        let steps = build_steps(&entries(
            "- step: goto\n  name: skip\n- step: bulletin\n  html: skipped\n- step: target\n  name: skip\n",
        ))
        .unwrap();
        let StepKind::Goto(goto) = &steps[&0].kind else {
            panic!("expected goto");
        };
        assert_eq!(goto.target, Some(20));
    }

    #[test]
    fn test_goto_to_unknown_target_fails_at_load_time() {
        let err = build_steps(&entries("- step: goto\n  name: ghost\n")).unwrap_err();
        assert!(err.to_string().contains("ghost"), "{err}");
    }

    #[test]
    fn test_backward_goto_fails_at_load_time() {
        let err = build_steps(&entries(
            "- step: target\n  name: back\n- step: goto\n  name: back\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("forward"), "{err}");
    }

    #[test]
    fn test_duplicate_target_names_fail_at_load_time() {
        let err = build_steps(&entries(
            "- step: target\n  name: x\n- step: target\n  name: x\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }

    #[tokio::test]
    async fn test_response_to_a_complete_step_is_rejected() {
        let ctx = mock::MockStepContext::new();
        let step = parse_step(&entry("step: choice\nkey: k\nchoices:\n- A: a\n"), 0).unwrap();
        step.handle_response(&ctx, &StepResponse {
            value: None,
            choice_id: Some("A".to_owned()),
        })
        .await
        .unwrap();
        let err = step
            .handle_response(&ctx, &StepResponse {
                value: None,
                choice_id: Some("A".to_owned()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Choice already made.");
    }

    #[tokio::test]
    async fn test_response_to_a_non_input_step_is_rejected() {
        let ctx = mock::MockStepContext::new();
        let step = parse_step(&entry("step: pause\nfor: 60\n"), 0).unwrap();
        let err = step
            .handle_response(&ctx, &StepResponse::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot submit data to this step.");
    }

    #[test]
    fn test_target_with_if_guard_fails_at_load_time() {
        let err = build_steps(&entries(
            "- step: target\n  name: x\n  if: \"VAR('a')\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("'if'"), "{err}");
    }
}
