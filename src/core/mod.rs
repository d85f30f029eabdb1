//! Core types shared by the sync engine.
//!
//! Time representation, stream kinds and the session configuration. Every
//! policy knob lives in [`config::SessionConfig`]; nothing here is global.

pub mod config;
pub mod error;
pub mod lock;
pub mod time;

pub use config::{GateConfig, QueueLimits, SessionConfig, SyncMode, SyncThresholds};
pub use error::{Error, QueueError, Result, SyncError};
pub use lock::{LockManager, RawMutexLockManager};
pub use time::{Seconds, TimeBase};
