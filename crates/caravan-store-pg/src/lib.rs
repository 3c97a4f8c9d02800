//! `PostgreSQL` implementation of the Caravan persistence boundary.

mod pg_game_store;
pub mod schema;

pub use pg_game_store::PgGameStore;
