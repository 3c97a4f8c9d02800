//! Caravan Engine — durable, resumable execution of scenario scripts.
//!
//! A scenario is defined by a declarative YAML script: an ordered list of
//! typed steps. The engine interprets the script for one team at a time,
//! tracking per-team/per-game/per-step variables through the persistence
//! boundary, driving asynchronous timers as durable deadlines, resolving
//! goto/target branching, and pushing incremental UI deltas to connected
//! clients. Every step effect is idempotent, so a process restart simply
//! re-runs the current step without double-applying anything.

pub mod context;
pub mod expr;
pub mod manager;
pub mod registry;
pub mod script_loader;
pub mod steps;
pub mod ui;
