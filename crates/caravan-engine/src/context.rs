//! The seam between steps and the game manager.
//!
//! Steps only ever touch a narrow, object-safe slice of the manager:
//! raw variable reads/writes, UI pushes, the player list, game status,
//! the clock, the RNG, and expression evaluation. Tests substitute a
//! mock; the real implementation is [`crate::manager::GameManager`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use caravan_core::error::EngineError;
use caravan_core::ids::{PlayerId, StepId};
use caravan_core::status::GameStatus;
use caravan_core::store::VarUpdate;
use caravan_core::vars::{GameVar, VarScope, decode_var, encode_var};

use crate::expr::ExprValue;

/// The manager API visible to steps.
#[async_trait]
pub trait StepContext: Send + Sync {
    /// Read a variable's stored value from the in-memory snapshot by its
    /// storage key. Team scope resolves pending writes over committed
    /// team values. Pure, no I/O.
    fn raw_var(&self, scope: VarScope, storage_key: &str) -> Option<Value>;

    /// Apply a read-modify-write update to a variable under the owning
    /// row's lock, refresh the snapshot, and return the written value.
    async fn write_var(
        &self,
        scope: VarScope,
        storage_key: &str,
        update: VarUpdate<'_>,
    ) -> Result<Value, EngineError>;

    /// Push the step's current UI projection to all players.
    async fn push_ui_update(&self, step_id: StepId) -> Result<(), EngineError>;

    /// Ids of the players in this game.
    fn player_ids(&self) -> Vec<PlayerId>;

    /// Current lifecycle status of the game.
    fn status(&self) -> GameStatus;

    /// Current time, via the injected clock.
    fn now(&self) -> DateTime<Utc>;

    /// A random integer in `[min, max]` inclusive, via the injected RNG.
    fn next_u32_range(&self, min: u32, max: u32) -> u32;

    /// Evaluate a script-embedded expression against Game- then
    /// Team-scoped variables.
    fn eval_expression(&self, expression: &str) -> Result<ExprValue, EngineError>;
}

/// Typed read of a variable through a step context. Returns the
/// descriptor's default when the variable has never been written.
///
/// # Errors
///
/// Fails if a step-scoped descriptor is used without a step id or the
/// stored value does not decode as `T`.
pub fn get_var<T>(
    ctx: &dyn StepContext,
    var: &GameVar<T>,
    step_id: Option<StepId>,
) -> Result<T, EngineError>
where
    T: DeserializeOwned + Clone,
{
    let key = var.storage_key(step_id)?;
    decode_var(var, ctx.raw_var(var.scope, &key).as_ref())
}

/// Typed read-modify-write of a variable through a step context. The
/// updater sees the current value (or the default) as read under the
/// row lock, never a cached copy.
///
/// # Errors
///
/// Fails on scope misuse, storage errors, or if the stored value does
/// not round-trip as `T`.
pub async fn set_var<T, F>(
    ctx: &dyn StepContext,
    var: &GameVar<T>,
    step_id: Option<StepId>,
    update: F,
) -> Result<T, EngineError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
    F: Fn(T) -> T + Send + Sync,
{
    let key = var.storage_key(step_id)?;
    let raw = ctx
        .write_var(var.scope, &key, &|current| {
            let value = decode_var(var, current)?;
            encode_var(&key, &update(value))
        })
        .await?;
    decode_var(var, Some(&raw))
}

/// Overwrite a variable with a fixed value.
///
/// # Errors
///
/// Same failure modes as [`set_var`].
pub async fn set_var_to<T>(
    ctx: &dyn StepContext,
    var: &GameVar<T>,
    step_id: Option<StepId>,
    value: T,
) -> Result<T, EngineError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    set_var(ctx, var, step_id, |_| value.clone()).await
}

/// Sleep 'correctly': durable across process restarts.
///
/// Each `sleep_id` names one single-use timer within the step's scope.
/// The deadline is stored as a step-scoped variable on first use; later
/// calls (e.g. after a restart) recompute the remaining wait against the
/// clock instead of restarting the full duration, and return immediately
/// once the deadline has passed.
///
/// # Errors
///
/// Returns `EngineError::Conflict` if the game stopped running while
/// sleeping, so the rest of the step's `run()` is skipped.
pub async fn durable_sleep(
    ctx: &dyn StepContext,
    step_id: StepId,
    sleep_id: &str,
    duration: Duration,
) -> Result<(), EngineError> {
    let deadline_var: GameVar<Option<i64>> =
        GameVar::step(format!("sleep_until:{sleep_id}"), None);
    let deadline_ms = match get_var(ctx, &deadline_var, Some(step_id))? {
        Some(ms) => ms,
        None => {
            let target = ctx.now().timestamp_millis()
                + i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
            set_var_to(ctx, &deadline_var, Some(step_id), Some(target)).await?;
            target
        }
    };
    let remaining_ms = deadline_ms - ctx.now().timestamp_millis();
    if remaining_ms > 0 {
        #[allow(clippy::cast_sign_loss)]
        tokio::time::sleep(Duration::from_millis(remaining_ms as u64)).await;
    }
    if ctx.status().is_running() {
        Ok(())
    } else {
        Err(EngineError::conflict(
            "game is over; skipping the rest of this step",
        ))
    }
}
