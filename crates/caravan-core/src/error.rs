//! Engine error taxonomy.

use thiserror::Error;

use crate::ids::GameId;

/// Top-level error type for the scenario engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A user-facing validation error. The message is safe to surface
    /// verbatim to the caller and never leaks internals.
    #[error("{0}")]
    User(String),

    /// A script integrity error: malformed document, unknown step type,
    /// goto/target mismatch, or a missing required config field. Fatal
    /// at load time; the scenario cannot start.
    #[error("script error: {0}")]
    Script(String),

    /// A concurrency-loss error: a race on starting or terminating a
    /// game that another writer won.
    #[error("{0}")]
    Conflict(String),

    /// A game row was not found or is no longer active.
    #[error("game {0} not found")]
    GameNotFound(GameId),

    /// A transient infrastructure/persistence error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// A user-facing error with the given safe message.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// A load-time script integrity error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    /// A lost-race error with a clear user message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// A transient storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
