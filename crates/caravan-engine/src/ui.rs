//! Client-facing UI projections of step state.
//!
//! These shapes are the wire contract with the frontend; field names are
//! stable. A step whose projection is `None` renders nothing yet.

use serde::Serialize;

use caravan_core::ids::StepId;

/// UI projection for one choice in a multiple-choice step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceUi {
    /// Stable choice identifier from the script.
    pub id: String,
    /// Label shown to the user.
    pub choice_text: String,
    /// Whether the team selected this choice.
    pub selected: bool,
    /// Correctness annotation, or None when no annotation should show.
    pub correct: Option<bool>,
}

/// UI projection of one step, tagged by step type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StepUi {
    /// Messages revealed so far, optionally attributed to a character.
    #[serde(rename = "MessageStep", rename_all = "camelCase")]
    Message {
        /// The step that owns this projection.
        step_id: StepId,
        /// The messages revealed so far, in order.
        messages: Vec<String>,
        /// Speaking character, if the script names one.
        #[serde(skip_serializing_if = "Option::is_none")]
        character: Option<String>,
    },

    /// Free-text prompt state.
    #[serde(rename = "FreeResponseStep", rename_all = "camelCase")]
    FreeResponse {
        /// The step that owns this projection.
        step_id: StepId,
        /// Whether the client should render a multi-line input.
        multiline: bool,
        /// Whether an accepted value has been recorded.
        complete: bool,
        /// The accepted value, if any.
        value: String,
        /// Rejected guesses, shown back to the user.
        invalid_guesses: Vec<String>,
    },

    /// Multiple-choice prompt state.
    #[serde(rename = "MultipleChoiceStep", rename_all = "camelCase")]
    MultipleChoice {
        /// The step that owns this projection.
        step_id: StepId,
        /// Whether a valid choice has been recorded.
        choice_made: bool,
        /// The choices with selection/correctness annotations.
        choices: Vec<ChoiceUi>,
    },

    /// A fixed HTML bulletin.
    #[serde(rename = "BulletinStep", rename_all = "camelCase")]
    Bulletin {
        /// The step that owns this projection.
        step_id: StepId,
        /// The bulletin markup.
        bulletin_html: String,
    },

    /// A progress marker.
    #[serde(rename = "ProgressStep", rename_all = "camelCase")]
    Progress {
        /// The step that owns this projection.
        step_id: StepId,
        /// Accompanying message markup.
        message_html: String,
        /// Progress percentage, 0–100.
        percentage: f64,
    },

    /// A map pin.
    #[serde(rename = "MapStep", rename_all = "camelCase")]
    Map {
        /// The step that owns this projection.
        step_id: StepId,
        /// Pin latitude.
        latitude: f64,
        /// Pin longitude.
        longitude: f64,
        /// Initial zoom level.
        zoom_level: f64,
        /// Accompanying message markup.
        message_html: String,
    },

    /// The end-of-scenario marker.
    #[serde(rename = "FinishLineStep", rename_all = "camelCase")]
    FinishLine {
        /// The step that owns this projection.
        step_id: StepId,
    },
}
