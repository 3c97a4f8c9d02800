//! Process-wide registry of game managers.
//!
//! One manager per active game id. Concurrent loads for the same game
//! coalesce through a shared `OnceCell`, so two requests arriving
//! together never build two managers and double-run the current step. A
//! failed load is forgotten so the next request can retry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::warn;

use caravan_core::error::EngineError;
use caravan_core::ids::{GameId, ScenarioId, TeamId};
use caravan_core::notify::Notification;

use crate::manager::{GameManager, GameManagerDeps};

/// Managers kept resident at once. Beyond this, the least recently
/// loaded entry is dropped; its game reloads from durable state on next
/// access.
const DEFAULT_CAPACITY: usize = 1024;

type ManagerCell = Arc<OnceCell<Arc<GameManager>>>;

struct RegistryInner {
    cells: HashMap<GameId, ManagerCell>,
    /// Insertion order, for eviction.
    order: VecDeque<GameId>,
}

pub struct ManagerRegistry {
    deps: GameManagerDeps,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl ManagerRegistry {
    pub fn new(deps: GameManagerDeps) -> Self {
        Self::with_capacity(deps, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(deps: GameManagerDeps, capacity: usize) -> Self {
        Self {
            deps,
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner {
                cells: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn cell_for(&self, game_id: GameId) -> ManagerCell {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cell) = inner.cells.get(&game_id) {
            return Arc::clone(cell);
        }
        while inner.cells.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.cells.remove(&evicted);
                warn!(game_id = evicted, "evicted game manager from registry");
            } else {
                break;
            }
        }
        let cell: ManagerCell = Arc::new(OnceCell::new());
        inner.cells.insert(game_id, Arc::clone(&cell));
        inner.order.push_back(game_id);
        cell
    }

    fn forget(&self, game_id: GameId, cell: &ManagerCell) {
        let mut inner = self.inner.lock().unwrap();
        // Only drop the entry if it still holds the cell we failed on;
        // a concurrent retry may already have replaced it.
        if inner
            .cells
            .get(&game_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            inner.cells.remove(&game_id);
            inner.order.retain(|id| *id != game_id);
        }
    }

    /// Get the manager for a game, loading it if needed. Concurrent
    /// callers for the same game share one load.
    ///
    /// # Errors
    ///
    /// Propagates the load failure; the failed entry is forgotten so a
    /// later call can retry.
    pub async fn game(&self, game_id: GameId) -> Result<Arc<GameManager>, EngineError> {
        let cell = self.cell_for(game_id);
        let result = cell
            .get_or_try_init(|| GameManager::load(self.deps.clone(), game_id))
            .await;
        match result {
            Ok(manager) => Ok(Arc::clone(manager)),
            Err(e) => {
                self.forget(game_id, &cell);
                Err(e)
            }
        }
    }

    /// Start a new game for a team and return its manager.
    ///
    /// # Errors
    ///
    /// Rejects teams outside the 2..=5 player range, inactive scenarios,
    /// and a team that already has an active game.
    pub async fn start_game(
        &self,
        team_id: TeamId,
        scenario_id: ScenarioId,
    ) -> Result<Arc<GameManager>, EngineError> {
        let members = self.deps.store.active_members(team_id).await?;
        if members.len() < 2 {
            return Err(EngineError::user(
                "You must have at least two people on your team to play.",
            ));
        }
        if members.len() > 5 {
            return Err(EngineError::user("Too many people on the team."));
        }
        let scenario = self
            .deps
            .store
            .scenario(scenario_id)
            .await?
            .ok_or_else(|| EngineError::user("Invalid scenario."))?;
        let game = self
            .deps
            .store
            .create_game(team_id, scenario_id)
            .await
            .map_err(|e| match e {
                EngineError::Conflict(_) => {
                    EngineError::user("Unable to start playing. Did the game already start?")
                }
                other => other,
            })?;
        let manager = self.game(game.id).await?;
        self.deps
            .notifier
            .publish(
                &members,
                &Notification::GameStatusChanged {
                    scenario_id: scenario.id,
                    scenario_name: scenario.name,
                    is_active: true,
                },
            )
            .await;
        Ok(manager)
    }

    /// Abandon a game and release its manager. Idempotent: abandoning a
    /// game that already ended is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates load or storage failure.
    pub async fn abandon_game(&self, game_id: GameId) -> Result<(), EngineError> {
        let cell = self.cell_for(game_id);
        match self.game(game_id).await {
            Ok(manager) => {
                manager.abandon().await?;
                self.forget(game_id, &cell);
                Ok(())
            }
            // Already terminated; nothing to do.
            Err(EngineError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
