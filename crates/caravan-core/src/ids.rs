//! Identifier aliases for the persistent entities.
//!
//! The relational store hands out plain integer ids; aliases keep
//! signatures readable without the ceremony of newtypes.

/// A game (one playthrough of a scenario by one team).
pub type GameId = i64;

/// A team of players.
pub type TeamId = i64;

/// An authored scenario (script + metadata).
pub type ScenarioId = i64;

/// A player (already authenticated by the session layer).
pub type PlayerId = i64;

/// A step within a loaded script. Derived from the step's position in
/// the script (index × 10, leaving room for future insertion).
pub type StepId = i64;
