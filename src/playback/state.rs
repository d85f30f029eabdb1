//! Playback state machine.

use crate::core::time::Seconds;

/// Playback state of a session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlaybackState {
    /// No playback active, streams closed
    #[default]
    Stopped,
    /// Waiting for every enabled stream to buffer enough packets
    Buffering,
    /// Presenting frames against the master clock
    Playing,
    /// Clocks frozen at `position` (None if the master had no time yet)
    Paused { position: Option<Seconds> },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }

    pub fn is_buffering(&self) -> bool {
        matches!(self, PlaybackState::Buffering)
    }

    /// Whether the presenter should be consuming frames
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(PlaybackState::default().is_stopped());
        assert!(PlaybackState::Buffering.is_active());
        assert!(PlaybackState::Playing.is_active());
        let paused = PlaybackState::Paused { position: Some(1.0) };
        assert!(paused.is_paused());
        assert!(!paused.is_active());
    }
}
