//! Per-game orchestrator.
//!
//! One [`GameManager`] exists per active game (enforced by
//! [`crate::registry::ManagerRegistry`]). It owns the parsed step map,
//! in-memory copies of the variable blobs kept consistent with the
//! database after every write, the team's current-step pointer, and the
//! UI update sequence counter. Step code never touches any of this
//! directly; it goes through the [`StepContext`] seam.

use std::collections::HashSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use caravan_core::clock::Clock;
use caravan_core::error::EngineError;
use caravan_core::ids::{GameId, PlayerId, StepId, TeamId};
use caravan_core::notify::{Notification, Notifier};
use caravan_core::rng::GameRng;
use caravan_core::script::ScriptSource;
use caravan_core::status::GameStatus;
use caravan_core::store::{GameStore, ScenarioRow, VarMap, VarUpdate};
use caravan_core::vars::{GameVar, VarScope};

use crate::context::{StepContext, get_var, set_var};
use crate::expr::{self, ExprValue};
use crate::script_loader::load_script;
use crate::steps::{Step, StepKind, StepResponse, build_steps};
use crate::ui::StepUi;

/// External services a game manager runs against.
#[derive(Clone)]
pub struct GameManagerDeps {
    pub store: Arc<dyn GameStore>,
    pub scripts: Arc<dyn ScriptSource>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<Mutex<dyn GameRng>>,
}

/// Step ids the team has seen, in order. The last element is the
/// current-step pointer. Durable, so a restart resumes at the same step.
fn steps_seen_var() -> GameVar<Vec<StepId>> {
    GameVar::game("stepsSeen", Vec::new())
}

pub struct GameManager {
    deps: GameManagerDeps,
    game_id: GameId,
    team_id: TeamId,
    scenario: ScenarioRow,
    player_ids: Vec<PlayerId>,
    /// Committed team vars as of load. Fresh values are re-read inside
    /// the store's finish transaction, never trusted from this copy.
    team_vars: VarMap,
    game_vars: RwLock<VarMap>,
    pending_team_vars: RwLock<VarMap>,
    steps: std::collections::BTreeMap<StepId, Step>,
    status: RwLock<GameStatus>,
    /// Incremented on every UI update notification. In-memory only: a
    /// restart resets it, the resulting gap makes clients refresh.
    ui_update_seq: AtomicU64,
    /// Steps whose run() has been started by this process. run() is
    /// started at most once per process; durable guards inside each
    /// step make the re-run after a restart safe.
    runs_started: Mutex<HashSet<StepId>>,
}

impl std::fmt::Debug for GameManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameManager")
            .field("game_id", &self.game_id)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl GameManager {
    /// Load the manager for an active game: fetch the game, scenario,
    /// team, and roster, load and link the script, then start or resume
    /// execution at the durable current-step pointer.
    ///
    /// # Errors
    ///
    /// Fails if the game does not exist or is no longer active, the
    /// scenario is gone, or the script does not load.
    pub async fn load(deps: GameManagerDeps, game_id: GameId) -> Result<Arc<Self>, EngineError> {
        let game = deps.store.game(game_id).await?;
        if !game.is_active || game.finished.is_some() {
            return Err(EngineError::conflict(format!(
                "Game {game_id} is not active."
            )));
        }
        let scenario = deps
            .store
            .scenario(game.scenario_id)
            .await?
            .ok_or_else(|| EngineError::user("Invalid scenario."))?;
        let entries = load_script(deps.scripts.as_ref(), &scenario.script).await?;
        let steps = build_steps(&entries)?;
        let team = deps.store.team(game.team_id).await?;
        let player_ids = deps.store.active_members(game.team_id).await?;

        let manager = Arc::new(Self {
            deps,
            game_id,
            team_id: game.team_id,
            scenario,
            player_ids,
            team_vars: team.game_vars,
            game_vars: RwLock::new(game.game_vars),
            pending_team_vars: RwLock::new(game.pending_team_vars),
            steps,
            status: RwLock::new(GameStatus::InProgress),
            ui_update_seq: AtomicU64::new(0),
            runs_started: Mutex::new(HashSet::new()),
        });

        let seen = manager.steps_seen()?;
        if seen.iter().any(|id| {
            matches!(
                manager.steps.get(id),
                Some(Step {
                    kind: StepKind::FinishLine(_),
                    ..
                })
            )
        }) {
            *manager.status.write().unwrap() = GameStatus::InReview;
        }
        if seen.is_empty() {
            // A fresh game: advance to the first step of the script.
            let first = manager.steps.keys().next().copied();
            manager.advance_to_step(first).await?;
        } else {
            // Resuming after a restart: re-run the current step. Durable
            // guards inside each step make this safe.
            manager.run_current_step();
        }
        Ok(manager)
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn scenario(&self) -> &ScenarioRow {
        &self.scenario
    }

    pub fn status(&self) -> GameStatus {
        *self.status.read().unwrap()
    }

    fn steps_seen(&self) -> Result<Vec<StepId>, EngineError> {
        get_var(self, &steps_seen_var(), None)
    }

    fn current_step_id(&self) -> Result<Option<StepId>, EngineError> {
        Ok(self.steps_seen()?.last().copied())
    }

    /// UI projections of every step the team has seen, in order. The
    /// client renders these as the scrollback plus the live step.
    ///
    /// # Errors
    ///
    /// Fails only if stored variable state does not decode.
    pub fn ui_state(&self) -> Result<Vec<Option<StepUi>>, EngineError> {
        self.steps_seen()?
            .iter()
            .map(|id| match self.steps.get(id) {
                Some(step) => step.ui_state(self),
                None => Ok(None),
            })
            .collect()
    }

    /// The step id execution moves to after `step_id` completes. A goto
    /// jumps straight to its linked target; anything else falls through
    /// to the next step in script order.
    fn step_id_following(&self, step_id: StepId) -> Option<StepId> {
        if let Some(step) = self.steps.get(&step_id) {
            if let StepKind::Goto(goto) = &step.kind {
                return goto.target;
            }
        }
        self.sequential_following(step_id)
    }

    /// The next step in script order, ignoring goto jumps. Used when a
    /// step is skipped by its guard, since a skipped goto never fires.
    fn sequential_following(&self, step_id: StepId) -> Option<StepId> {
        self.steps
            .range((Bound::Excluded(step_id), Bound::Unbounded))
            .next()
            .map(|(id, _)| *id)
    }

    /// Move the current-step pointer to `step_id`, skipping steps whose
    /// `if` guard is falsy, then start the new step. `None` means the
    /// script is exhausted and the game finishes.
    ///
    /// # Errors
    ///
    /// Fails on an attempt to revisit a seen step (the forward-only
    /// invariant), on a guard that does not evaluate, or on storage
    /// failure.
    pub async fn advance_to_step(
        self: &Arc<Self>,
        step_id: Option<StepId>,
    ) -> Result<(), EngineError> {
        let mut next = step_id;
        loop {
            let Some(id) = next else {
                return self.finish().await;
            };
            let step = self
                .steps
                .get(&id)
                .ok_or_else(|| EngineError::script(format!("no step with id {id}")))?;
            if self.steps_seen()?.contains(&id) {
                return Err(EngineError::conflict(
                    "Cannot revisit a step that has already been seen.",
                ));
            }
            if let Some(guard) = &step.if_condition {
                if !self.eval_expression(guard)?.is_truthy() {
                    next = self.sequential_following(id);
                    continue;
                }
            }
            set_var(self.as_ref(), &steps_seen_var(), None, move |mut seen: Vec<StepId>| {
                seen.push(id);
                seen
            })
            .await?;
            if matches!(step.kind, StepKind::FinishLine(_)) {
                // The scenario proper is over; epilogue steps may still
                // run before the game row is finished.
                *self.status.write().unwrap() = GameStatus::InReview;
                info!(game_id = self.game_id, "team reached the finish line");
            }
            self.run_current_step();
            if step.ui_state(self.as_ref())?.is_some() {
                self.push_ui_update_inner(id).await?;
            }
            return Ok(());
        }
    }

    /// Start the current step's run() in the background, once per
    /// process. Completion advances the team; failure is logged, not
    /// propagated, because nothing is awaiting it.
    fn run_current_step(self: &Arc<Self>) {
        let Ok(Some(current_id)) = self.current_step_id() else {
            return;
        };
        let Some(step) = self.steps.get(&current_id).cloned() else {
            return;
        };
        {
            let mut started = self.runs_started.lock().unwrap();
            if !started.insert(current_id) {
                return;
            }
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = step.run(manager.as_ref()).await {
                if manager.status().is_running() {
                    error!(game_id = manager.game_id, step_id = current_id, error = %e,
                        "step run failed");
                }
                return;
            }
            let complete = match step.is_complete(manager.as_ref()) {
                Ok(complete) => complete,
                Err(e) => {
                    error!(game_id = manager.game_id, step_id = current_id, error = %e,
                        "step completion check failed");
                    return;
                }
            };
            if complete
                && manager.status().is_running()
                && manager.current_step_id().ok().flatten() == Some(current_id)
            {
                let next = manager.step_id_following(current_id);
                if let Err(e) = manager.advance_to_step(next).await {
                    error!(game_id = manager.game_id, step_id = current_id, error = %e,
                        "failed to advance after step completed");
                }
            }
        });
    }

    /// Route a user response to the step with the given id.
    ///
    /// # Errors
    ///
    /// Rejects responses to anything but the current step, responses to
    /// an already-complete step, and invalid input.
    pub async fn call_step_handler(
        self: &Arc<Self>,
        step_id: StepId,
        data: &StepResponse,
    ) -> Result<(), EngineError> {
        if self.current_step_id()? != Some(step_id) {
            return Err(EngineError::user("Cannot submit answer: game has moved on."));
        }
        let step = self
            .steps
            .get(&step_id)
            .ok_or_else(|| EngineError::script(format!("no step with id {step_id}")))?;
        step.handle_response(self.as_ref(), data).await?;
        if step.is_complete(self.as_ref())? {
            let next = self.step_id_following(step_id);
            self.advance_to_step(next).await?;
        }
        Ok(())
    }

    async fn push_ui_update_inner(&self, step_id: StepId) -> Result<(), EngineError> {
        let Some(step_index) = self.steps_seen()?.iter().position(|id| *id == step_id) else {
            // Not visible yet; nothing to notify about.
            return Ok(());
        };
        let new_step_ui = match self.steps.get(&step_id) {
            Some(step) => step
                .ui_state(self)?
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| EngineError::storage(format!("ui state failed to serialize: {e}")))?,
            None => None,
        };
        let seq = self.ui_update_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.deps
            .notifier
            .publish(
                &self.player_ids,
                &Notification::GameUiUpdate {
                    ui_update_seq_id: seq,
                    step_index,
                    new_step_ui,
                },
            )
            .await;
        Ok(())
    }

    async fn publish_game_over(&self) {
        self.deps
            .notifier
            .publish(
                &self.player_ids,
                &Notification::GameStatusChanged {
                    scenario_id: 0,
                    scenario_name: String::new(),
                    is_active: false,
                },
            )
            .await;
    }

    /// Abandon the game: mark the row inactive and discard pending team
    /// vars. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails only on storage failure.
    pub async fn abandon(&self) -> Result<(), EngineError> {
        *self.status.write().unwrap() = GameStatus::Abandoned;
        self.deps.store.abandon_game(self.game_id).await?;
        info!(game_id = self.game_id, "game abandoned");
        self.publish_game_over().await;
        Ok(())
    }

    /// Finish the game: mark the row finished and merge pending team
    /// vars into the team's committed vars, in one guarded transaction.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Conflict` if a concurrent abandon or finish
    /// already terminated the game.
    pub async fn finish(&self) -> Result<(), EngineError> {
        self.deps.store.finish_game(self.game_id, self.team_id).await?;
        *self.status.write().unwrap() = GameStatus::Complete;
        info!(game_id = self.game_id, "game finished");
        self.publish_game_over().await;
        Ok(())
    }
}

#[async_trait]
impl StepContext for GameManager {
    fn raw_var(&self, scope: VarScope, storage_key: &str) -> Option<Value> {
        match scope {
            // Step-scoped keys are namespaced into the game blob.
            VarScope::Game | VarScope::Step => {
                self.game_vars.read().unwrap().get(storage_key).cloned()
            }
            VarScope::Team => {
                let pending = self.pending_team_vars.read().unwrap();
                pending
                    .get(storage_key)
                    .or_else(|| self.team_vars.get(storage_key))
                    .cloned()
            }
        }
    }

    async fn write_var(
        &self,
        scope: VarScope,
        storage_key: &str,
        update: VarUpdate<'_>,
    ) -> Result<Value, EngineError> {
        if !self.status().is_running() {
            return Err(EngineError::conflict(
                "Cannot update any variable after the game is complete.",
            ));
        }
        match scope {
            VarScope::Game | VarScope::Step => {
                let outcome = self
                    .deps
                    .store
                    .update_game_var(self.game_id, storage_key, update)
                    .await?;
                *self.game_vars.write().unwrap() = outcome.vars;
                Ok(outcome.value)
            }
            VarScope::Team => {
                // A first write to a key starts from the committed team
                // value, not the default.
                let committed = self.team_vars.get(storage_key);
                let layered: VarUpdate<'_> =
                    &move |pending: Option<&Value>| update(pending.or(committed));
                let outcome = self
                    .deps
                    .store
                    .update_pending_team_var(self.game_id, storage_key, layered)
                    .await?;
                *self.pending_team_vars.write().unwrap() = outcome.vars;
                Ok(outcome.value)
            }
        }
    }

    async fn push_ui_update(&self, step_id: StepId) -> Result<(), EngineError> {
        self.push_ui_update_inner(step_id).await
    }

    fn player_ids(&self) -> Vec<PlayerId> {
        self.player_ids.clone()
    }

    fn status(&self) -> GameStatus {
        *self.status.read().unwrap()
    }

    fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    fn next_u32_range(&self, min: u32, max: u32) -> u32 {
        self.deps.rng.lock().unwrap().next_u32_range(min, max)
    }

    fn eval_expression(&self, expression: &str) -> Result<ExprValue, EngineError> {
        let resolver = |name: &str| {
            self.raw_var(VarScope::Game, name)
                .or_else(|| self.raw_var(VarScope::Team, name))
                .as_ref()
                .map(ExprValue::from_json)
        };
        expr::evaluate(expression, &resolver)
    }
}
