//! Caravan Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types the scenario
//! engine and its infrastructure adapters depend on: scoped game
//! variables, the persistence/notification/script-source boundaries,
//! and the error taxonomy. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod ids;
pub mod notify;
pub mod rng;
pub mod script;
pub mod status;
pub mod store;
pub mod vars;
