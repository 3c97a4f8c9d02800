//! Script loading and include expansion.
//!
//! A script document is a YAML sequence of step entries. An entry of the
//! form `- include: other-script` (and nothing else on that entry) is
//! replaced, depth-first and order-preserving, with the entries of the
//! named script. Scripts are addressed by opaque name through the
//! [`ScriptSource`] boundary, never by filesystem path.

use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::script::ScriptSource;
use caravan_core::store::VarMap;

/// Includes deeper than this are assumed to be a cycle.
const MAX_INCLUDE_DEPTH: u32 = 10;

/// Load a script by name, expanding includes. The returned entries are
/// raw step mappings; step parsing/validation happens separately in
/// [`crate::steps::build_steps`].
///
/// # Errors
///
/// Returns `EngineError::Script` if the named script (or any included
/// script) does not exist, does not parse as YAML, or has an invalid
/// shape; and `EngineError::Storage` if the source fails.
pub async fn load_script(
    source: &dyn ScriptSource,
    name: &str,
) -> Result<Vec<VarMap>, EngineError> {
    let yaml = source
        .load_raw(name)
        .await?
        .ok_or_else(|| EngineError::script(format!("script \"{name}\" not found")))?;
    expand(source, name, &yaml, 0).await
}

/// Validate a script document supplied as a YAML string (e.g. from the
/// authoring UI) without running it: expands includes and parses every
/// step, surfacing the first problem found.
///
/// # Errors
///
/// Same failure modes as [`load_script`], plus any step config error.
pub async fn validate_script_yaml(
    source: &dyn ScriptSource,
    yaml: &str,
) -> Result<(), EngineError> {
    let entries = expand(source, "(unsaved)", yaml, 0).await?;
    crate::steps::build_steps(&entries)?;
    Ok(())
}

/// Parse one document and splice in included scripts. Boxed for async
/// recursion.
fn expand<'a>(
    source: &'a dyn ScriptSource,
    name: &'a str,
    yaml: &'a str,
    depth: u32,
) -> std::pin::Pin<
    Box<dyn Future<Output = Result<Vec<VarMap>, EngineError>> + Send + 'a>,
> {
    Box::pin(async move {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(EngineError::script(format!(
                "script \"{name}\" exceeds the include depth limit; include cycle?"
            )));
        }
        let parsed: Value = serde_yaml::from_str(yaml).map_err(|e| {
            tracing::error!(script = name, error = %e, "script failed to parse");
            EngineError::script(format!("error when parsing script \"{name}\""))
        })?;
        let Value::Array(entries) = parsed else {
            return Err(EngineError::script(format!(
                "script \"{name}\" format is invalid: expected the root to be a list"
            )));
        };

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::Object(mapping) = entry else {
                return Err(EngineError::script(format!(
                    "script \"{name}\" contains a step that is not a mapping"
                )));
            };
            if let Some(target) = mapping.get("include") {
                if mapping.len() != 1 {
                    return Err(EngineError::script(format!(
                        "script \"{name}\": an include entry must have no other keys"
                    )));
                }
                let Value::String(target) = target else {
                    return Err(EngineError::script(format!(
                        "script \"{name}\": include target must be a script name"
                    )));
                };
                let included_yaml = source.load_raw(target).await?.ok_or_else(|| {
                    EngineError::script(format!("script \"{target}\" not found"))
                })?;
                let mut included = expand(source, target, &included_yaml, depth + 1).await?;
                result.append(&mut included);
            } else {
                result.push(mapping);
            }
        }
        Ok(result)
    })
}
