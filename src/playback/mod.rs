pub mod buffer_gate;
pub mod engine;
pub mod state;
pub mod sync;

pub use buffer_gate::BufferGate;
pub use engine::{PlaybackCommand, PlaybackEngine};
pub use state::PlaybackState;
pub use sync::{MasterSource, SyncController, SyncStats, Verdict};
