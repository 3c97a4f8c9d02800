//! `PostgreSQL`-backed implementation of the `GameStore` and
//! `ScriptSource` traits.
//!
//! Variable writes run inside a `SELECT ... FOR UPDATE` transaction and
//! persist with `jsonb_set`, so concurrent writes to different keys on
//! the same row never clobber each other and writes to the same key
//! serialize through the row lock.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;

use caravan_core::error::EngineError;
use caravan_core::ids::{GameId, PlayerId, ScenarioId, TeamId};
use caravan_core::script::ScriptSource;
use caravan_core::store::{
    GameRow, GameStore, ScenarioRow, TeamRow, VarMap, VarUpdate, VarWriteOutcome,
};

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed game store.
#[derive(Debug, Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

fn storage_err(e: sqlx::Error) -> EngineError {
    EngineError::storage(format!("database error: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn game_row(row: &sqlx::postgres::PgRow) -> Result<GameRow, EngineError> {
    Ok(GameRow {
        id: row.try_get("id").map_err(storage_err)?,
        team_id: row.try_get("team_id").map_err(storage_err)?,
        scenario_id: row.try_get("scenario_id").map_err(storage_err)?,
        started: row.try_get("started").map_err(storage_err)?,
        is_active: row.try_get("is_active").map_err(storage_err)?,
        finished: row.try_get("finished").map_err(storage_err)?,
        game_vars: row
            .try_get::<Json<VarMap>, _>("game_vars")
            .map_err(storage_err)?
            .0,
        pending_team_vars: row
            .try_get::<Json<VarMap>, _>("pending_team_vars")
            .map_err(storage_err)?
            .0,
    })
}

impl PgGameStore {
    /// Creates a new `PgGameStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create all tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` on database failure.
    pub async fn ensure_schema(&self) -> Result<(), EngineError> {
        for statement in [
            crate::schema::CREATE_TEAMS_TABLE,
            crate::schema::CREATE_TEAM_MEMBERS_TABLE,
            crate::schema::CREATE_SCENARIOS_TABLE,
            crate::schema::CREATE_SCRIPTS_TABLE,
            crate::schema::CREATE_GAMES_TABLE,
        ] {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Locked read-modify-write of one key in one JSONB column of the
    /// game's row. `column` is a trusted identifier, never user input.
    async fn update_var_column(
        &self,
        game_id: GameId,
        column: &str,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let row = sqlx::query(&format!(
            "SELECT {column} FROM games WHERE id = $1 FOR UPDATE"
        ))
        .bind(game_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?
        .ok_or(EngineError::GameNotFound(game_id))?;
        let vars = row
            .try_get::<Json<VarMap>, _>(column)
            .map_err(storage_err)?
            .0;

        let new_value = update(vars.get(key))?;

        let row = sqlx::query(&format!(
            "UPDATE games SET {column} = jsonb_set({column}, $2, $3) WHERE id = $1 RETURNING {column}"
        ))
        .bind(game_id)
        .bind(vec![key.to_owned()])
        .bind(Json(new_value.clone()))
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?;
        let vars = row
            .try_get::<Json<VarMap>, _>(column)
            .map_err(storage_err)?
            .0;
        tx.commit().await.map_err(storage_err)?;
        debug!(game_id, column, key, "variable updated");
        Ok(VarWriteOutcome {
            value: new_value,
            vars,
        })
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn game(&self, game_id: GameId) -> Result<GameRow, EngineError> {
        let row = sqlx::query(
            "SELECT id, team_id, scenario_id, started, is_active, finished,
                    game_vars, pending_team_vars
             FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or(EngineError::GameNotFound(game_id))?;
        game_row(&row)
    }

    async fn create_game(
        &self,
        team_id: TeamId,
        scenario_id: ScenarioId,
    ) -> Result<GameRow, EngineError> {
        let result = sqlx::query(
            "INSERT INTO games (team_id, scenario_id, is_active)
             VALUES ($1, $2, TRUE)
             RETURNING id, team_id, scenario_id, started, is_active, finished,
                       game_vars, pending_team_vars",
        )
        .bind(team_id)
        .bind(scenario_id)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => game_row(&row),
            Err(e) if is_unique_violation(&e) => Err(EngineError::conflict(
                "team already has an active game",
            )),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn team(&self, team_id: TeamId) -> Result<TeamRow, EngineError> {
        let row = sqlx::query("SELECT id, name, game_vars FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| EngineError::storage(format!("no team {team_id}")))?;
        Ok(TeamRow {
            id: row.try_get("id").map_err(storage_err)?,
            name: row.try_get("name").map_err(storage_err)?,
            game_vars: row
                .try_get::<Json<VarMap>, _>("game_vars")
                .map_err(storage_err)?
                .0,
        })
    }

    async fn active_members(&self, team_id: TeamId) -> Result<Vec<PlayerId>, EngineError> {
        let rows = sqlx::query(
            "SELECT user_id FROM team_members WHERE team_id = $1 AND is_active ORDER BY user_id",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|row| row.try_get("user_id").map_err(storage_err))
            .collect()
    }

    async fn scenario(&self, scenario_id: ScenarioId) -> Result<Option<ScenarioRow>, EngineError> {
        let row = sqlx::query(
            "SELECT id, name, script, is_active FROM scenarios WHERE id = $1 AND is_active",
        )
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(|row| {
            Ok(ScenarioRow {
                id: row.try_get("id").map_err(storage_err)?,
                name: row.try_get("name").map_err(storage_err)?,
                script: row.try_get("script").map_err(storage_err)?,
                is_active: row.try_get("is_active").map_err(storage_err)?,
            })
        })
        .transpose()
    }

    async fn update_game_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError> {
        self.update_var_column(game_id, "game_vars", key, update).await
    }

    async fn update_pending_team_var(
        &self,
        game_id: GameId,
        key: &str,
        update: VarUpdate<'_>,
    ) -> Result<VarWriteOutcome, EngineError> {
        self.update_var_column(game_id, "pending_team_vars", key, update)
            .await
    }

    async fn abandon_game(&self, game_id: GameId) -> Result<(), EngineError> {
        sqlx::query("UPDATE games SET is_active = FALSE WHERE id = $1")
            .bind(game_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn finish_game(&self, game_id: GameId, team_id: TeamId) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        // The is_active guard decides the race against a concurrent
        // abandon or finish; zero rows means the other side won.
        let row = sqlx::query(
            "UPDATE games SET finished = NOW(), is_active = FALSE
             WHERE id = $1 AND is_active = TRUE
             RETURNING pending_team_vars",
        )
        .bind(game_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| EngineError::conflict("Game was not active."))?;
        let pending = row
            .try_get::<Json<VarMap>, _>("pending_team_vars")
            .map_err(storage_err)?
            .0;

        // Merge onto a fresh locked read of the team row, never the
        // manager's cached copy. Pending keys win on conflict.
        let row = sqlx::query("SELECT game_vars FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?;
        let mut team_vars = row
            .try_get::<Json<VarMap>, _>("game_vars")
            .map_err(storage_err)?
            .0;
        for (key, value) in pending {
            team_vars.insert(key, value);
        }
        sqlx::query("UPDATE teams SET game_vars = $2 WHERE id = $1")
            .bind(team_id)
            .bind(Json(team_vars))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ScriptSource for PgGameStore {
    async fn load_raw(&self, name: &str) -> Result<Option<String>, EngineError> {
        let row = sqlx::query("SELECT yaml FROM scripts WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|row| row.try_get("yaml").map_err(storage_err))
            .transpose()
    }
}
