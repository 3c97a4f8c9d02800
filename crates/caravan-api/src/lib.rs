//! Caravan HTTP API.
//!
//! Thin axum layer over the engine: routes translate HTTP requests into
//! registry and manager calls and engine errors into status codes. All
//! game semantics live in `caravan-engine`.

pub mod error;
pub mod notifier;
pub mod routes;
pub mod state;
