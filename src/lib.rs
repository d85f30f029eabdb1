//! Real-time audio/video synchronization engine.
//!
//! Compressed packets flow from a demuxer into per-stream [`queue::PacketQueue`]s,
//! decoders pop them and report frame timestamps, and the
//! [`playback::SyncController`] answers with a [`playback::Verdict`] measured
//! against the master [`clock::Clock`]. The [`playback::BufferGate`] holds
//! playback until streams are buffered and tells the demuxer when to back off.

pub mod clock;
pub mod core;
pub mod playback;
pub mod queue;
pub mod stream;

pub use crate::core::{Error, Result, SessionConfig, SyncMode};
pub use clock::Clock;
pub use playback::{BufferGate, PlaybackCommand, PlaybackEngine, PlaybackState, SyncController, Verdict};
pub use queue::{Packet, PacketQueue, PopMode, Popped};
pub use stream::{Stream, StreamKind};
