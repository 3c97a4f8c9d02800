//! Script source boundary.
//!
//! Scripts are stored documents addressed by an opaque name resolved
//! against a fixed collection (never a filesystem path), so path
//! traversal is impossible by construction.

use async_trait::async_trait;

use crate::error::EngineError;

/// Supplies raw script documents (YAML text) by name.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Load the raw YAML text of the named script, or None if no script
    /// with that name exists.
    async fn load_raw(&self, name: &str) -> Result<Option<String>, EngineError>;
}
