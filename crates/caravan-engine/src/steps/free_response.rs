//! Free-response step: a free-text prompt, optionally with an allow-list
//! of acceptable answers.

use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::GameVar;

use crate::context::{StepContext, get_var, set_var, set_var_to};
use crate::ui::StepUi;

use super::{StepResponse, require_str};

#[derive(Debug, Clone)]
pub struct FreeResponseStep {
    /// Name of the step-scoped variable the accepted answer is stored in.
    pub key: String,
    /// Acceptable answers, compared case-insensitively. Empty means any
    /// non-empty answer is accepted.
    pub allowed: Vec<String>,
    /// Whether the client should render a multi-line input.
    pub multiline: bool,
}

fn invalid_guesses_var() -> GameVar<Vec<String>> {
    GameVar::step("invalid_guesses", Vec::new())
}

impl FreeResponseStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `key` is missing or `allowed` is
    /// not a list of strings.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let key = require_str(
            config,
            "key",
            "a free response step must have a key defined (e.g. 'key: userGuess')",
        )?;
        let allowed = match config.get("allowed") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| match entry {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(EngineError::script(
                        "each entry in a free response step's 'allowed' list must be a string",
                    )),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(EngineError::script(
                    "a free response step's 'allowed' parameter must be a list of strings",
                ));
            }
        };
        let multiline = config.get("multiline").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            key,
            allowed,
            multiline,
        })
    }

    fn value_var(&self) -> GameVar<String> {
        GameVar::step(self.key.clone(), String::new())
    }

    fn is_allowed(&self, value: &str) -> bool {
        self.allowed.is_empty()
            || self
                .allowed
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(value))
    }

    pub(super) fn ui_state(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<Option<StepUi>, EngineError> {
        let value = get_var(ctx, &self.value_var(), Some(id))?;
        Ok(Some(StepUi::FreeResponse {
            step_id: id,
            multiline: self.multiline,
            complete: !value.is_empty(),
            value,
            invalid_guesses: get_var(ctx, &invalid_guesses_var(), Some(id))?,
        }))
    }

    pub(super) fn is_complete(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<bool, EngineError> {
        Ok(!get_var(ctx, &self.value_var(), Some(id))?.is_empty())
    }

    /// Accept or reject the submitted text. A rejected guess is not an
    /// error: it is recorded and echoed back so the team sees what has
    /// been tried.
    pub(super) async fn handle_response(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
        data: &StepResponse,
    ) -> Result<(), EngineError> {
        let value = data.value.as_deref().unwrap_or("").trim().to_owned();
        if value.is_empty() {
            return Err(EngineError::user("Invalid input (empty)."));
        }
        if !self.is_allowed(&value) {
            set_var(ctx, &invalid_guesses_var(), Some(id), move |mut guesses| {
                guesses.push(value.clone());
                guesses
            })
            .await?;
            ctx.push_ui_update(id).await?;
            return Ok(());
        }
        set_var_to(ctx, &self.value_var(), Some(id), value).await?;
        ctx.push_ui_update(id).await?;
        Ok(())
    }
}
