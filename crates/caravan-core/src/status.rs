//! Game lifecycle status.

/// Lifecycle state of a game as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// The team is partway through the script.
    InProgress,
    /// The team has passed the finish line in the script and is in the
    /// post-scenario review. This status is never saved to the database;
    /// it only exists in memory and is lost on restart.
    InReview,
    /// The game was abandoned; pending team-var writes were discarded.
    Abandoned,
    /// The game finished; pending team-var writes were merged into the
    /// team's committed vars.
    Complete,
}

impl GameStatus {
    /// Whether the script is still running (steps may execute and
    /// variables may be written).
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::InProgress | Self::InReview)
    }
}
