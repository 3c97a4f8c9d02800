//! Multiple-choice step.

use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::GameVar;

use crate::context::{StepContext, get_var, set_var_to};
use crate::ui::{ChoiceUi, StepUi};

use super::{StepResponse, require_str};

/// One selectable choice.
#[derive(Debug, Clone)]
pub struct Choice {
    pub id: String,
    pub choice_text: String,
}

#[derive(Debug, Clone)]
pub struct MultipleChoiceStep {
    /// Name of the game-scoped variable that records the selected id.
    /// Game scope so later steps (and `if` guards) can branch on it.
    pub key: String,
    /// The choices, in script order.
    pub choices: Vec<Choice>,
    /// Id of the correct choice, if the script designates one that
    /// actually exists in `choices`.
    pub correct_choice: Option<String>,
}

impl MultipleChoiceStep {
    /// Parse step config of the form:
    ///
    /// ```yaml
    /// - step: choice
    ///   key: howfar
    ///   correct: halfway
    ///   choices:
    ///     - halfway: Halfway there
    ///     - alone: You said survive alone
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `key` or `choices` is missing or
    /// any choice entry is not a single-key mapping.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let key = require_str(
            config,
            "key",
            "a choice step must have a 'key' defined to store the team's choice",
        )?;
        let Some(Value::Array(entries)) = config.get("choices") else {
            return Err(EngineError::script(
                "a choice step must have a list of choices called 'choices'",
            ));
        };
        let mut choices = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::Object(mapping) = entry else {
                return Err(EngineError::script("invalid choice in choice step"));
            };
            let mut keys = mapping.iter();
            let (Some((id, label)), None) = (keys.next(), keys.next()) else {
                return Err(EngineError::script("invalid choice in choice step"));
            };
            let Value::String(choice_text) = label else {
                return Err(EngineError::script("invalid choice in choice step"));
            };
            choices.push(Choice {
                id: id.clone(),
                choice_text: choice_text.clone(),
            });
        }
        // A 'correct' id that names no real choice is ignored rather
        // than rejected; deployed scripts depend on the lenient read.
        let correct_choice = match config.get("correct") {
            Some(Value::String(correct)) if choices.iter().any(|c| c.id == *correct) => {
                Some(correct.clone())
            }
            _ => None,
        };
        Ok(Self {
            key,
            choices,
            correct_choice,
        })
    }

    fn choice_var(&self) -> GameVar<String> {
        GameVar::game(self.key.clone(), String::new())
    }

    fn is_choice_id_valid(&self, choice_id: &str) -> bool {
        self.choices.iter().any(|c| c.id == choice_id)
    }

    /// Correctness annotation for one choice, shown only once a choice
    /// has been made and only when the script designates a right answer.
    /// The right answer is always revealed; a wrong selection is flagged
    /// false; everything else stays unannotated.
    fn correctness(&self, choice_made: bool, selected: bool, choice_id: &str) -> Option<bool> {
        if !choice_made {
            return None;
        }
        let correct = self.correct_choice.as_deref()?;
        if selected {
            Some(correct == choice_id)
        } else if correct == choice_id {
            Some(true)
        } else {
            None
        }
    }

    pub(super) fn ui_state(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<Option<StepUi>, EngineError> {
        let choice_id = get_var(ctx, &self.choice_var(), None)?;
        let choice_made = self.is_complete(ctx)?;
        Ok(Some(StepUi::MultipleChoice {
            step_id: id,
            choice_made,
            choices: self
                .choices
                .iter()
                .map(|c| {
                    let selected = choice_id == c.id;
                    ChoiceUi {
                        id: c.id.clone(),
                        choice_text: c.choice_text.clone(),
                        selected,
                        correct: self.correctness(choice_made, selected, &c.id),
                    }
                })
                .collect(),
        }))
    }

    pub(super) fn is_complete(&self, ctx: &dyn StepContext) -> Result<bool, EngineError> {
        let choice_id = get_var(ctx, &self.choice_var(), None)?;
        Ok(!choice_id.is_empty() && self.is_choice_id_valid(&choice_id))
    }

    pub(super) async fn handle_response(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
        data: &StepResponse,
    ) -> Result<(), EngineError> {
        let choice_id = data.choice_id.as_deref().unwrap_or("");
        if !self.is_choice_id_valid(choice_id) {
            return Err(EngineError::user("Invalid choice."));
        }
        set_var_to(ctx, &self.choice_var(), None, choice_id.to_owned()).await?;
        ctx.push_ui_update(id).await?;
        Ok(())
    }
}
