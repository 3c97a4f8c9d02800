//! Target step: a named jump destination.

use caravan_core::error::EngineError;
use caravan_core::store::VarMap;

use super::require_str;

/// Control-flow marker, always complete, no UI. A target must be
/// unconditional; skipping one behind a falsy guard would strand any
/// goto that jumps to it.
#[derive(Debug, Clone)]
pub struct TargetStep {
    /// Name gotos refer to. Unique within a script.
    pub name: String,
}

impl TargetStep {
    /// Parse step config.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` if `name` is missing or the step
    /// declares an `if` guard.
    pub fn parse(config: &VarMap, has_if: bool) -> Result<Self, EngineError> {
        if has_if {
            return Err(EngineError::script(
                "a target step may not declare an 'if' condition",
            ));
        }
        Ok(Self {
            name: require_str(
                config,
                "name",
                "a target step must have a 'name' parameter",
            )?,
        })
    }
}
