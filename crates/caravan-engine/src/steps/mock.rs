//! In-memory step context for unit testing step behavior without a
//! manager or a database.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::{PlayerId, StepId};
use caravan_core::status::GameStatus;
use caravan_core::store::{VarMap, VarUpdate};
use caravan_core::vars::VarScope;

use crate::context::StepContext;
use crate::expr::{self, ExprValue};

fn scope_index(scope: VarScope) -> usize {
    match scope {
        VarScope::Team => 0,
        VarScope::Game => 1,
        VarScope::Step => 2,
    }
}

pub(crate) struct MockStepContext {
    vars: Mutex<[VarMap; 3]>,
    pushes: Mutex<Vec<StepId>>,
    player_ids: Mutex<Vec<PlayerId>>,
    status: Mutex<GameStatus>,
    now: DateTime<Utc>,
    rng_values: Mutex<VecDeque<u32>>,
}

impl MockStepContext {
    pub(crate) fn new() -> Self {
        Self {
            vars: Mutex::new([VarMap::new(), VarMap::new(), VarMap::new()]),
            pushes: Mutex::new(Vec::new()),
            player_ids: Mutex::new(vec![1, 2]),
            status: Mutex::new(GameStatus::InProgress),
            now: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            rng_values: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn seed_game_var(&self, key: &str, value: Value) {
        self.vars.lock().unwrap()[scope_index(VarScope::Game)].insert(key.to_owned(), value);
    }

    pub(crate) fn set_player_ids(&self, ids: Vec<PlayerId>) {
        *self.player_ids.lock().unwrap() = ids;
    }

    pub(crate) fn set_status(&self, status: GameStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Queue deterministic values for `next_u32_range`. An exhausted
    /// queue yields the range minimum.
    #[allow(dead_code)]
    pub(crate) fn queue_rng(&self, values: impl IntoIterator<Item = u32>) {
        self.rng_values.lock().unwrap().extend(values);
    }

    /// Step ids that UI updates were pushed for, in order.
    pub(crate) fn pushes(&self) -> Vec<StepId> {
        self.pushes.lock().unwrap().clone()
    }

    /// All variable state, for before/after idempotence comparisons.
    pub(crate) fn snapshot_vars(&self) -> [VarMap; 3] {
        self.vars.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepContext for MockStepContext {
    fn raw_var(&self, scope: VarScope, storage_key: &str) -> Option<Value> {
        self.vars.lock().unwrap()[scope_index(scope)]
            .get(storage_key)
            .cloned()
    }

    async fn write_var(
        &self,
        scope: VarScope,
        storage_key: &str,
        update: VarUpdate<'_>,
    ) -> Result<Value, EngineError> {
        let mut vars = self.vars.lock().unwrap();
        let map = &mut vars[scope_index(scope)];
        let new_value = update(map.get(storage_key))?;
        map.insert(storage_key.to_owned(), new_value.clone());
        Ok(new_value)
    }

    async fn push_ui_update(&self, step_id: StepId) -> Result<(), EngineError> {
        self.pushes.lock().unwrap().push(step_id);
        Ok(())
    }

    fn player_ids(&self) -> Vec<PlayerId> {
        self.player_ids.lock().unwrap().clone()
    }

    fn status(&self) -> GameStatus {
        *self.status.lock().unwrap()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn next_u32_range(&self, min: u32, max: u32) -> u32 {
        self.rng_values
            .lock()
            .unwrap()
            .pop_front()
            .map_or(min, |v| v.clamp(min, max))
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
