//! End-to-end engine tests: scripts running through a real manager and
//! registry against the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use caravan_core::notify::Notification;
use caravan_core::status::GameStatus;
use caravan_engine::manager::{GameManager, GameManagerDeps};
use caravan_engine::registry::ManagerRegistry;
use caravan_engine::steps::StepResponse;
use caravan_engine::ui::StepUi;
use caravan_test_support::{FixedClock, MemoryStore, MockRng, RecordingNotifier};

const TEAM: i64 = 1;
const SCENARIO: i64 = 7;

fn deps(store: &Arc<MemoryStore>, notifier: &Arc<RecordingNotifier>) -> GameManagerDeps {
    GameManagerDeps {
        store: store.clone(),
        scripts: store.clone(),
        notifier: notifier.clone(),
        clock: Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )),
        rng: Arc::new(Mutex::new(MockRng)),
    }
}

fn store_with_script(script: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_team(TEAM, "The Dustwalkers", vec![1, 2, 3]);
    store.add_scenario(SCENARIO, "The Crossing", "main");
    store.add_script("main", script);
    store
}

/// Let background step tasks and paused-clock timers run out.
async fn settle() {
    tokio::time::sleep(Duration::from_secs(120)).await;
}

fn free_response(value: &str) -> StepResponse {
    serde_json::from_value(json!({ "value": value })).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_script_runs_to_completion_and_finishes_the_game() {
    let store = store_with_script(
        "- step: message\n  messages: [hi, there]\n- step: free response\n  key: guess\n- step: finish line\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));

    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    // The message step revealed everything and advanced to the prompt.
    let ui = manager.ui_state().unwrap();
    assert_eq!(ui.len(), 2);
    assert!(matches!(ui[0], Some(StepUi::Message { ref messages, .. }) if messages == &["hi", "there"]));
    assert!(matches!(ui[1], Some(StepUi::FreeResponse { complete: false, .. })));
    assert_eq!(manager.status(), GameStatus::InProgress);

    manager.call_step_handler(10, &free_response("onward")).await.unwrap();
    settle().await;

    assert_eq!(manager.status(), GameStatus::Complete);
    let row = store.game_row(manager.game_id());
    assert!(!row.is_active);
    assert!(row.finished.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_ui_update_seq_ids_are_gap_free_and_start_at_one() {
    let store = store_with_script(
        "- step: message\n  messages: [one, two, three]\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    let seqs: Vec<u64> = notifier
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Notification::GameUiUpdate {
                ui_update_seq_id, ..
            } => Some(ui_update_seq_id),
            Notification::GameStatusChanged { .. } => None,
        })
        .collect();
    assert!(!seqs.is_empty());
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);
}

#[tokio::test(start_paused = true)]
async fn test_second_submission_is_rejected_after_the_game_moves_on() {
    let store = store_with_script(
        "- step: choice\n  key: howfar\n  correct: B\n  choices:\n  - A: Turn back\n  - B: Press on\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    let pick_b: StepResponse = serde_json::from_value(json!({ "choiceId": "B" })).unwrap();
    manager.call_step_handler(0, &pick_b).await.unwrap();
    let err = manager.call_step_handler(0, &pick_b).await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot submit answer: game has moved on.");

    // The recorded choice is untouched.
    let ui = manager.ui_state().unwrap();
    assert!(matches!(
        ui[0],
        Some(StepUi::MultipleChoice {
            choice_made: true,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_abandon_discards_pending_team_vars() {
    let store = store_with_script(
        "- step: set\n  key: story\n  scope: team\n  to: \"VAR('story', 0) + 1\"\n- step: pause\n  for: 86400\n",
    );
    store.seed_team_var(TEAM, "story", json!(4));
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    // The pending write is staged on the game, not the team.
    assert_eq!(
        store.game_row(manager.game_id()).pending_team_vars["story"],
        json!(5.0)
    );
    registry.abandon_game(manager.game_id()).await.unwrap();
    assert_eq!(store.team_vars(TEAM)["story"], json!(4));
    assert_eq!(manager.status(), GameStatus::Abandoned);
}

#[tokio::test(start_paused = true)]
async fn test_finish_merges_pending_team_vars() {
    let store = store_with_script(
        "- step: set\n  key: story\n  scope: team\n  to: \"VAR('story', 0) + 1\"\n- step: pause\n  for: 86400\n",
    );
    store.seed_team_var(TEAM, "story", json!(4));
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    manager.finish().await.unwrap();
    assert_eq!(store.team_vars(TEAM)["story"], json!(5.0));
    // A second finish finds the game already terminated.
    assert!(manager.finish().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_goto_jumps_over_intervening_steps() {
    let store = store_with_script(
        "- step: goto\n  name: skip\n- step: bulletin\n  html: hidden\n- step: target\n  name: skip\n- step: bulletin\n  html: shown\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    let bulletins: Vec<String> = manager
        .ui_state()
        .unwrap()
        .into_iter()
        .filter_map(|ui| match ui {
            Some(StepUi::Bulletin { bulletin_html, .. }) => Some(bulletin_html),
            _ => None,
        })
        .collect();
    assert_eq!(bulletins, vec!["shown".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn test_falsy_if_guard_skips_a_step() {
    let store = store_with_script(
        "- step: set\n  key: brave\n  scope: game\n  to: \"0\"\n- step: bulletin\n  html: brave-only\n  if: \"VAR('brave')\"\n- step: bulletin\n  html: everyone\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    let bulletins: Vec<String> = manager
        .ui_state()
        .unwrap()
        .into_iter()
        .filter_map(|ui| match ui {
            Some(StepUi::Bulletin { bulletin_html, .. }) => Some(bulletin_html),
            _ => None,
        })
        .collect();
    assert_eq!(bulletins, vec!["everyone".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_at_the_recorded_step() {
    let store = store_with_script(
        "- step: free response\n  key: guess\n- step: bulletin\n  html: after\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;
    let game_id = manager.game_id();
    drop((manager, registry));

    // A new process: same durable state, fresh manager.
    let notifier2 = Arc::new(RecordingNotifier::new());
    let resumed = GameManager::load(deps(&store, &notifier2), game_id)
        .await
        .unwrap();
    settle().await;
    let ui = resumed.ui_state().unwrap();
    assert_eq!(ui.len(), 1);
    assert!(matches!(ui[0], Some(StepUi::FreeResponse { .. })));

    resumed
        .call_step_handler(0, &free_response("onward"))
        .await
        .unwrap();
    settle().await;
    let ui = resumed.ui_state().unwrap();
    assert!(matches!(ui[1], Some(StepUi::Bulletin { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_manager() {
    let store = store_with_script("- step: pause\n  for: 86400\n");
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();

    let (a, b) = tokio::join!(registry.game(manager.game_id()), registry.game(manager.game_id()));
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_is_retried_not_cached() {
    let store = store_with_script("- step: pause\n  for: 86400\n");
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));

    assert!(registry.game(999).await.is_err());
    // The failure is not pinned; a later load of a real game works.
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    assert!(registry.game(manager.game_id()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_start_game_validations() {
    let store = store_with_script("- step: pause\n  for: 86400\n");
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));

    store.set_members(TEAM, vec![1]);
    let err = registry.start_game(TEAM, SCENARIO).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "You must have at least two people on your team to play."
    );

    store.set_members(TEAM, vec![1, 2, 3, 4, 5, 6]);
    let err = registry.start_game(TEAM, SCENARIO).await.unwrap_err();
    assert_eq!(err.to_string(), "Too many people on the team.");

    store.set_members(TEAM, vec![1, 2, 3]);
    let err = registry.start_game(TEAM, 999).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid scenario.");

    registry.start_game(TEAM, SCENARIO).await.unwrap();
    let err = registry.start_game(TEAM, SCENARIO).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unable to start playing. Did the game already start?"
    );
}

#[tokio::test(start_paused = true)]
async fn test_reaching_the_finish_line_enters_review_before_the_epilogue() {
    let store = store_with_script(
        "- step: free response\n  key: guess\n- step: finish line\n- step: pause\n  for: 86400\n",
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    let manager = registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    manager.call_step_handler(0, &free_response("done")).await.unwrap();
    assert_eq!(manager.status(), GameStatus::InReview);
    // The game row stays active through the epilogue pause.
    assert!(store.game_row(manager.game_id()).is_active);
}

#[tokio::test(start_paused = true)]
async fn test_game_start_and_end_are_announced() {
    let store = store_with_script("- step: finish line\n");
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = ManagerRegistry::new(deps(&store, &notifier));
    registry.start_game(TEAM, SCENARIO).await.unwrap();
    settle().await;

    let status_events: Vec<Notification> = notifier
        .events()
        .into_iter()
        .filter(|event| matches!(event, Notification::GameStatusChanged { .. }))
        .collect();
    assert_eq!(
        status_events.first(),
        Some(&Notification::GameStatusChanged {
            scenario_id: SCENARIO,
            scenario_name: "The Crossing".to_owned(),
            is_active: true,
        })
    );
    assert_eq!(
        status_events.last(),
        Some(&Notification::GameStatusChanged {
            scenario_id: 0,
            scenario_name: String::new(),
            is_active: false,
        })
    );
}
