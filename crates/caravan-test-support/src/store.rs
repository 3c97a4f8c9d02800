//! In-memory store — a `GameStore` and `ScriptSource` implementation
//! with the same observable semantics as the PostgreSQL store: locked
//! read-modify-write per key, one active game per team, finish merges
//! pending team vars while abandon discards them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::{GameId, PlayerId, ScenarioId, TeamId};
use caravan_core::script::ScriptSource;
use caravan_core::store::{
    GameRow, GameStore, ScenarioRow, TeamRow, VarMap, VarUpdate, VarWriteOutcome,
};

#[derive(Default)]
struct Inner {
    teams: HashMap<TeamId, TeamRow>,
    members: HashMap<TeamId, Vec<PlayerId>>,
    scenarios: HashMap<ScenarioId, ScenarioRow>,
    scripts: HashMap<String, String>,
    games: HashMap<GameId, GameRow>,
    next_game_id: GameId,
}

/// In-memory backing store for engine tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a team with the given active members.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_team(&self, team_id: TeamId, name: &str, members: Vec<PlayerId>) {
        let mut inner = self.inner.lock().unwrap();
        inner.teams.insert(
            team_id,
            TeamRow {
                id: team_id,
                name: name.to_owned(),
                game_vars: VarMap::new(),
            },
        );
        inner.members.insert(team_id, members);
    }

    /// Replace a team's active member list.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_members(&self, team_id: TeamId, members: Vec<PlayerId>) {
        self.inner.lock().unwrap().members.insert(team_id, members);
    }

    /// Set one committed team-scoped variable directly.
    ///
    /// # Panics
    ///
    /// Panics if the team does not exist or the mutex is poisoned.
    pub fn seed_team_var(&self, team_id: TeamId, key: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .teams
            .get_mut(&team_id)
            .expect("unknown team")
            .game_vars
            .insert(key.to_owned(), value);
    }

    /// Add an active scenario running the named script.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_scenario(&self, scenario_id: ScenarioId, name: &str, script: &str) {
        self.inner.lock().unwrap().scenarios.insert(
            scenario_id,
            ScenarioRow {
                id: scenario_id,
                name: name.to_owned(),
                script: script.to_owned(),
                is_active: true,
            },
        );
    }

    /// Add a script document.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_script(&self, name: &str, yaml: &str) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(name.to_owned(), yaml.to_owned());
    }

    /// Snapshot of a game row.
    ///
    /// # Panics
    ///
    /// Panics if the game does not exist or the mutex is poisoned.
    #[must_use]
    pub fn game_row(&self, game_id: GameId) -> GameRow {
        self.inner.lock().unwrap().games[&game_id].clone()
    }

    /// A team's committed variables.
    ///
    /// # Panics
    ///
    /// Panics if the team does not exist or the mutex is poisoned.
    #[must_use]
    pub fn team_vars(&self, team_id: TeamId) -> VarMap {
        self.inner.lock().unwrap().teams[&team_id].game_vars.clone()
    }
}

fn apply_update(
    vars: &mut VarMap,
    key: &str,
    update: VarUpdate<'_>,
) -> Result<VarWriteOutcome, EngineError> {
    let new_value = update(vars.get(key))?;
    vars.insert(key.to_owned(), new_value.clone());
    Ok(VarWriteOutcome {
        value: new_value,
        vars: vars.clone(),
    })
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn game(&self, game_id: GameId) -> Result<GameRow, EngineError> {
        self.inner
            .lock()
            .unwrap()
            .games
            .get(&game_id)
            .cloned()
            .ok_or(EngineError::GameNotFound(game_id))
    }

    async fn create_game(
        &self,
        team_id: TeamId,
        scenario_id: ScenarioId,
    ) -> Result<GameRow, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .games
            .values()
            .any(|g| g.team_id == team_id && g.is_active)
        {
            return Err(EngineError::conflict(
                "team already has an active game",
            ));
        }
        inner.next_game_id += 1;
        let game = GameRow {
            id: inner.next_game_id,
            team_id,
            scenario_id,
            started: Utc::now(),
            is_active: true,
            finished: None,
            game_vars: VarMap::new(),
            pending_team_vars: VarMap::new(),
        };
        inner.games.insert(game.id, game.clone());
        Ok(game)
    }

    async fn team(&self, team_id: TeamId) -> Result<TeamRow, EngineError> {
        self.inner
            .lock()
            .unwrap()
            .teams
            .get(&team_id)
            .cloned()
            .ok_or_else(|| EngineError::storage(format!("no team {team_id}")))
    }

    async fn active_members(&self, team_id: TeamId) -> Result<Vec<PlayerId>, EngineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .members
            .get(&team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn scenario(&self, scenario_id: ScenarioId) -> Result<Option<ScenarioRow>, EngineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .scenarios
            .get(&scenario_id)
            .filter(|s| s.is_active)
            .cloned())
    }

    async fn update_game_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or(EngineError::GameNotFound(game_id))?;
        apply_update(&mut game.game_vars, key, update)
    }

    async fn update_pending_team_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or(EngineError::GameNotFound(game_id))?;
        apply_update(&mut game.pending_team_vars, key, update)
    }

    async fn abandon_game(&self, game_id: GameId) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or(EngineError::GameNotFound(game_id))?;
        // Idempotent; pending team vars are simply never merged.
        game.is_active = false;
        Ok(())
    }

    async fn finish_game(&self, game_id: GameId, team_id: TeamId) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or(EngineError::GameNotFound(game_id))?;
        if !game.is_active {
            return Err(EngineError::conflict("Game was not active."));
        }
        game.is_active = false;
        game.finished = Some(Utc::now());
        let pending = game.pending_team_vars.clone();
        let team = inner
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| EngineError::storage(format!("no team {team_id}")))?;
        // Pending keys win on conflict.
        for (key, value) in pending {
            team.game_vars.insert(key, value);
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptSource for MemoryStore {
    async fn load_raw(&self, name: &str) -> Result<Option<String>, EngineError> {
        Ok(self.inner.lock().unwrap().scripts.get(name).cloned())
    }
}
