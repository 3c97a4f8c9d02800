//! Scoped game variables.
//!
//! Scripts and steps store all durable state through 'game vars': typed,
//! defaulted key-value handles. A variable's identity is `(scope, key)`;
//! step-scoped variables are additionally namespaced by the owning step's
//! id at read/write time, so the same descriptor used from two different
//! steps addresses two different values.

use std::borrow::Cow;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EngineError;
use crate::ids::StepId;

/// Where a variable's value lives and how long it lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    /// Scoped to the team and lasting across all scenarios,
    /// e.g. the all-time saltine count.
    Team,
    /// Scoped to one game; only applies to the current scenario.
    Game,
    /// Scoped to one step of one game.
    Step,
}

/// A typed variable descriptor. Reading a variable that has never been
/// written returns `default`; callers never observe a missing value.
#[derive(Debug, Clone)]
pub struct GameVar<T> {
    /// The variable's name within its scope.
    pub key: Cow<'static, str>,
    /// The scope the value lives in.
    pub scope: VarScope,
    /// Value returned before any write.
    pub default: T,
}

impl<T> GameVar<T> {
    /// A team-scoped variable.
    pub fn team(key: impl Into<Cow<'static, str>>, default: T) -> Self {
        Self {
            key: key.into(),
            scope: VarScope::Team,
            default,
        }
    }

    /// A game-scoped variable.
    pub fn game(key: impl Into<Cow<'static, str>>, default: T) -> Self {
        Self {
            key: key.into(),
            scope: VarScope::Game,
            default,
        }
    }

    /// A step-scoped variable. Reads and writes must supply the owning
    /// step's id.
    pub fn step(key: impl Into<Cow<'static, str>>, default: T) -> Self {
        Self {
            key: key.into(),
            scope: VarScope::Step,
            default,
        }
    }

    /// The key under which this variable is stored in its JSON blob.
    /// Step-scoped variables are namespaced by step id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` for a step-scoped variable without
    /// a step id; that is a programming error and fails fast.
    pub fn storage_key(&self, step_id: Option<StepId>) -> Result<String, EngineError> {
        match self.scope {
            VarScope::Step => {
                let id = step_id.ok_or_else(|| {
                    EngineError::storage("must specify a step id to use a step-scoped variable")
                })?;
                Ok(format!("step{id}:{}", self.key))
            }
            VarScope::Team | VarScope::Game => Ok(self.key.to_string()),
        }
    }
}

/// Decode a stored JSON value into the variable's type, falling back to
/// the default when the variable has never been written.
///
/// # Errors
///
/// Returns `EngineError::Storage` if a stored value does not deserialize
/// as `T`; stored values must round-trip exactly.
pub fn decode_var<T: DeserializeOwned>(
    var: &GameVar<T>,
    stored: Option<&Value>,
) -> Result<T, EngineError>
where
    T: Clone,
{
    match stored {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            EngineError::storage(format!("variable '{}' has unexpected shape: {e}", var.key))
        }),
        None => Ok(var.default.clone()),
    }
}

/// Encode a typed value for storage.
///
/// # Errors
///
/// Returns `EngineError::Storage` if the value fails to serialize.
pub fn encode_var<T: Serialize>(key: &str, value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::storage(format!("variable '{key}' failed to serialize: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_scope_key_is_namespaced_by_step_id() {
        let var: GameVar<i64> = GameVar::step("show", 0);
        assert_eq!(var.storage_key(Some(40)).unwrap(), "step40:show");
    }

    #[test]
    fn test_step_scope_key_without_step_id_fails_fast() {
        let var: GameVar<i64> = GameVar::step("show", 0);
        assert!(var.storage_key(None).is_err());
    }

    #[test]
    fn test_team_and_game_scope_keys_ignore_step_id() {
        let team: GameVar<i64> = GameVar::team("saltines", 0);
        let game: GameVar<i64> = GameVar::game("counter", 0);
        assert_eq!(team.storage_key(Some(10)).unwrap(), "saltines");
        assert_eq!(game.storage_key(None).unwrap(), "counter");
    }

    #[test]
    fn test_decode_returns_default_before_any_write() {
        let var: GameVar<Vec<i64>> = GameVar::game("stepsSeen", Vec::new());
        assert_eq!(decode_var(&var, None).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_decode_preserves_string_values_exactly() {
        let var: GameVar<String> = GameVar::game("answer", String::new());
        let stored = Value::String("42".to_owned());
        assert_eq!(decode_var(&var, Some(&stored)).unwrap(), "42");
    }
}
