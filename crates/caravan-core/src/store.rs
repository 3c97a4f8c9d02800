//! Persistence boundary.
//!
//! The engine mutates the durable JSON blobs exclusively through this
//! trait. Implementations must provide row-level-locked read-modify-write
//! semantics per `(row, key)`: concurrent writes to different keys on the
//! same row never clobber each other, and concurrent writes to the same
//! key serialize through the lock, each applying its updater to a fresh
//! read. See `caravan-store-pg` for the PostgreSQL implementation and
//! `caravan-test-support` for the in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EngineError;
use crate::ids::{GameId, PlayerId, ScenarioId, TeamId};

/// A flat namespace of variable key → stored JSON value.
pub type VarMap = serde_json::Map<String, Value>;

/// Read-modify-write closure applied to a variable's current stored
/// value (None if never written) while the owning row is locked. An Err
/// aborts the transaction without writing.
pub type VarUpdate<'a> =
    &'a (dyn Fn(Option<&Value>) -> Result<Value, EngineError> + Send + Sync);

/// One playthrough of a scenario by one team.
#[derive(Debug, Clone)]
pub struct GameRow {
    /// Row id.
    pub id: GameId,
    /// The team playing this game.
    pub team_id: TeamId,
    /// The scenario being played.
    pub scenario_id: ScenarioId,
    /// When the game started.
    pub started: DateTime<Utc>,
    /// Whether the game is still running. At most one active game exists
    /// per team.
    pub is_active: bool,
    /// When the game finished successfully, if it did. Stays null for
    /// abandoned games.
    pub finished: Option<DateTime<Utc>>,
    /// Game-scoped and step-scoped (namespaced) variable values.
    pub game_vars: VarMap,
    /// Tentative team-scoped writes made during this game. Merged into
    /// the team's `game_vars` on finish; discarded on abandon.
    pub pending_team_vars: VarMap,
}

/// A persistent team.
#[derive(Debug, Clone)]
pub struct TeamRow {
    /// Row id.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Committed team-scoped variable values.
    pub game_vars: VarMap,
}

/// An authored scenario a team can choose to play.
#[derive(Debug, Clone)]
pub struct ScenarioRow {
    /// Row id.
    pub id: ScenarioId,
    /// Display name.
    pub name: String,
    /// Name of the script document this scenario runs.
    pub script: String,
    /// Whether the scenario is currently offered.
    pub is_active: bool,
}

/// Result of a locked variable write: the value that was written and the
/// full blob as of the transaction's commit, used to refresh in-memory
/// caches.
#[derive(Debug, Clone)]
pub struct VarWriteOutcome {
    /// The new value of the written key.
    pub value: Value,
    /// The owning blob after the write.
    pub vars: VarMap,
}

/// Relational store for teams, games, and their variable blobs.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Load a game row by id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::GameNotFound` if no such row exists.
    async fn game(&self, game_id: GameId) -> Result<GameRow, EngineError>;

    /// Insert a new active game for the team. The store must enforce the
    /// one-active-game-per-team constraint and surface a double-start
    /// race as `EngineError::Conflict`.
    async fn create_game(
        &self,
        team_id: TeamId,
        scenario_id: ScenarioId,
    ) -> Result<GameRow, EngineError>;

    /// Load a team row by id.
    async fn team(&self, team_id: TeamId) -> Result<TeamRow, EngineError>;

    /// Ids of the team's currently active members.
    async fn active_members(&self, team_id: TeamId) -> Result<Vec<PlayerId>, EngineError>;

    /// Load an active scenario by id, or None.
    async fn scenario(&self, scenario_id: ScenarioId) -> Result<Option<ScenarioRow>, EngineError>;

    /// Apply `update` to one key of the game's `game_vars` blob inside a
    /// row-level-lock transaction, using a targeted partial update so
    /// other keys on the row are untouched.
    async fn update_game_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError>;

    /// Same as [`GameStore::update_game_var`] but against the game's
    /// `pending_team_vars` blob (staged team-scope writes).
    async fn update_pending_team_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError>;

    /// Mark the game inactive. Idempotent: abandoning an already
    /// terminated game is a no-op. Pending team vars are discarded by
    /// construction (they are simply never merged).
    async fn abandon_game(&self, game_id: GameId) -> Result<(), EngineError>;

    /// Mark the game finished and merge its `pending_team_vars` onto the
    /// team's committed `game_vars` (pending keys win on conflict), all
    /// inside one transaction guarded by `WHERE is_active = TRUE`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Conflict` ("Game was not active.") if a
    /// concurrent terminate already won.
    async fn finish_game(&self, game_id: GameId, team_id: TeamId) -> Result<(), EngineError>;
}
