//! Shared test doubles for the Caravan game backend.

mod clock;
mod notifier;
mod rng;
mod store;

pub use clock::FixedClock;
pub use notifier::RecordingNotifier;
pub use rng::{MockRng, SequenceRng};
pub use store::MemoryStore;
