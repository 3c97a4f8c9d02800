//! Routes for game lifecycle and step interaction.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use caravan_core::ids::{GameId, ScenarioId, StepId, TeamId};
use caravan_core::status::GameStatus;
use caravan_engine::manager::GameManager;
use caravan_engine::steps::StepResponse;
use caravan_engine::ui::StepUi;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    /// The team that wants to play.
    pub team_id: TeamId,
    /// The scenario to play.
    pub scenario_id: ScenarioId,
}

/// Full game state returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateResponse {
    /// The game's id.
    pub game_id: GameId,
    /// The scenario in play.
    pub scenario_id: ScenarioId,
    /// Display name of the scenario.
    pub scenario_name: String,
    /// Lifecycle status label.
    pub status: &'static str,
    /// One UI projection per step seen so far, in script order.
    pub steps: Vec<Option<StepUi>>,
}

fn status_label(status: GameStatus) -> &'static str {
    match status {
        GameStatus::InProgress => "IN_PROGRESS",
        GameStatus::InReview => "IN_REVIEW",
        GameStatus::Abandoned => "ABANDONED",
        GameStatus::Complete => "COMPLETE",
    }
}

fn game_state(manager: &Arc<GameManager>) -> Result<GameStateResponse, ApiError> {
    Ok(GameStateResponse {
        game_id: manager.game_id(),
        scenario_id: manager.scenario().id,
        scenario_name: manager.scenario().name.clone(),
        status: status_label(manager.status()),
        steps: manager.ui_state()?,
    })
}

/// POST /
#[instrument(skip(state))]
async fn start_game(
    State(state): State<AppState>,
    Json(request): Json<StartGameRequest>,
) -> Result<Json<GameStateResponse>, ApiError> {
    info!(
        team_id = request.team_id,
        scenario_id = request.scenario_id,
        "starting game"
    );
    let manager = state
        .registry
        .start_game(request.team_id, request.scenario_id)
        .await?;
    Ok(Json(game_state(&manager)?))
}

/// GET /{game_id}
#[instrument(skip(state))]
async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameStateResponse>, ApiError> {
    let manager = state.registry.game(game_id).await?;
    Ok(Json(game_state(&manager)?))
}

/// POST /{game_id}/steps/{step_id}/response
#[instrument(skip(state, request))]
async fn submit_response(
    State(state): State<AppState>,
    Path((game_id, step_id)): Path<(GameId, StepId)>,
    Json(request): Json<StepResponse>,
) -> Result<Json<GameStateResponse>, ApiError> {
    let manager = state.registry.game(game_id).await?;
    manager.call_step_handler(step_id, &request).await?;
    Ok(Json(game_state(&manager)?))
}

/// POST /{game_id}/abandon
#[instrument(skip(state))]
async fn abandon_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<StatusCode, ApiError> {
    info!(game_id, "abandoning game");
    state.registry.abandon_game(game_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for the game context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_game))
        .route("/{game_id}", get(get_game))
        .route("/{game_id}/abandon", post(abandon_game))
        .route("/{game_id}/steps/{step_id}/response", post(submit_response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_are_stable() {
        assert_eq!(status_label(GameStatus::InProgress), "IN_PROGRESS");
        assert_eq!(status_label(GameStatus::InReview), "IN_REVIEW");
        assert_eq!(status_label(GameStatus::Abandoned), "ABANDONED");
        assert_eq!(status_label(GameStatus::Complete), "COMPLETE");
    }
}
