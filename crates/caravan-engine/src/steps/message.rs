//! Message step: reveals a list of messages one at a time.

use std::time::Duration;

use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::StepId;
use caravan_core::store::VarMap;
use caravan_core::vars::GameVar;

use crate::context::{StepContext, durable_sleep, get_var, set_var, set_var_to};
use crate::ui::StepUi;

/// Delay between consecutive message reveals.
const MESSAGE_CADENCE: Duration = Duration::from_millis(1750);

/// One entry in a message step's list: either fixed text or a computed
/// expression. The script syntax for an expression is a single-element
/// list: `- [ VAR('leader') + ' takes point' ]`.
#[derive(Debug, Clone)]
pub enum MessageTemplate {
    /// Plain message text.
    Text(String),
    /// An expression evaluated once when the step first runs.
    Expr(String),
}

/// Reveals its messages at a fixed cadence, using durable sleep
/// deadlines so a restart resumes the remaining wait instead of
/// restarting it.
#[derive(Debug, Clone)]
pub struct MessageStep {
    /// The messages to reveal, in order.
    pub messages: Vec<MessageTemplate>,
    /// Speaking character, if any.
    pub character: Option<String>,
}

fn num_shown_var() -> GameVar<i64> {
    GameVar::step("show", 0)
}

/// Cache slot for message `idx` once its expression is evaluated.
fn expr_cache_var(idx: usize) -> GameVar<String> {
    GameVar::step(format!("c{idx}"), String::new())
}

impl MessageStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `messages` is missing or any
    /// entry is not a string or single-element expression list.
    pub fn parse(config: &VarMap) -> Result<Self, EngineError> {
        let Some(Value::Array(raw)) = config.get("messages") else {
            return Err(EngineError::script(
                "message step must have a list of messages defined",
            ));
        };
        let mut messages = Vec::with_capacity(raw.len());
        for entry in raw {
            match entry {
                Value::String(text) => messages.push(MessageTemplate::Text(text.clone())),
                Value::Array(inner) => {
                    let [Value::String(expr)] = inner.as_slice() else {
                        return Err(EngineError::script(
                            "a computed message must be a single-element list holding an expression",
                        ));
                    };
                    messages.push(MessageTemplate::Expr(expr.clone()));
                }
                _ => {
                    return Err(EngineError::script(
                        "each message must be a string or a single-element expression list",
                    ));
                }
            }
        }
        let character = match config.get("character") {
            None => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(EngineError::script(format!(
                    "invalid character: {other}"
                )));
            }
        };
        Ok(Self {
            messages,
            character,
        })
    }

    /// Evaluate and cache computed messages, then slowly reveal each
    /// message after a short delay. Idempotent: the revealed counter and
    /// per-message sleep deadlines are durable.
    pub(super) async fn run(&self, ctx: &dyn StepContext, id: StepId) -> Result<(), EngineError> {
        for (idx, message) in self.messages.iter().enumerate() {
            if let MessageTemplate::Expr(expr) = message {
                let rendered = ctx.eval_expression(expr)?.display();
                set_var_to(ctx, &expr_cache_var(idx), Some(id), rendered).await?;
            }
        }
        loop {
            let shown = get_var(ctx, &num_shown_var(), Some(id))?;
            if shown >= self.len() {
                break;
            }
            durable_sleep(ctx, id, &format!("m{shown}"), MESSAGE_CADENCE).await?;
            set_var(ctx, &num_shown_var(), Some(id), |n| n + 1).await?;
            ctx.push_ui_update(id).await?;
        }
        Ok(())
    }

    fn len(&self) -> i64 {
        i64::try_from(self.messages.len()).unwrap_or(i64::MAX)
    }

    /// The messages revealed so far, with computed entries resolved from
    /// their cache slots.
    fn messages_evaluated(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
        count: usize,
    ) -> Result<Vec<String>, EngineError> {
        self.messages
            .iter()
            .take(count)
            .enumerate()
            .map(|(idx, message)| match message {
                MessageTemplate::Text(text) => Ok(text.clone()),
                MessageTemplate::Expr(_) => get_var(ctx, &expr_cache_var(idx), Some(id)),
            })
            .collect()
    }

    pub(super) fn ui_state(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<Option<StepUi>, EngineError> {
        let shown = get_var(ctx, &num_shown_var(), Some(id))?;
        if shown == 0 {
            return Ok(None);
        }
        let count = usize::try_from(shown).unwrap_or(0);
        Ok(Some(StepUi::Message {
            step_id: id,
            messages: self.messages_evaluated(ctx, id, count)?,
            character: self.character.clone(),
        }))
    }

    pub(super) fn is_complete(
        &self,
        ctx: &dyn StepContext,
        id: StepId,
    ) -> Result<bool, EngineError> {
        Ok(get_var(ctx, &num_shown_var(), Some(id))? >= self.len())
    }
}
