//! One elementary stream: its packet queue and its clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::core::config::QueueLimits;
use crate::core::time::{Seconds, TimeBase};
use crate::queue::PacketQueue;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Video => write!(f, "video"),
        }
    }
}

/// An elementary stream selected for playback.
/// Owns exactly one queue and one clock; shared between workers as `Arc<Stream>`.
#[derive(Debug)]
pub struct Stream {
    kind: StreamKind,
    index: usize,
    queue: Arc<PacketQueue>,
    clock: Clock,
    enabled: AtomicBool,
}

impl Stream {
    /// Create an enabled stream with an empty queue and an unset clock
    pub fn new(kind: StreamKind, index: usize, time_base: TimeBase, limits: QueueLimits) -> Self {
        let queue = Arc::new(PacketQueue::new(time_base, limits));
        let clock = Clock::new(queue.serial_handle());
        Self {
            kind,
            index,
            queue,
            clock,
            enabled: AtomicBool::new(true),
        }
    }

    /// Audio or video
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Container stream index packets are tagged with
    pub fn index(&self) -> usize {
        self.index
    }

    /// Time base of this stream's packet timestamps
    pub fn time_base(&self) -> TimeBase {
        self.queue.time_base()
    }

    /// Packet queue fed by the demuxer
    pub fn queue(&self) -> &Arc<PacketQueue> {
        &self.queue
    }

    /// Presentation clock of this stream
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Whether the stream takes part in sync and buffering decisions
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the stream
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Current stream time, `None` if unset or stale
    pub fn get_clock(&self) -> Option<Seconds> {
        self.clock.get()
    }

    /// Advance the clock to a presented frame of generation `serial`
    pub fn set_clock(&self, pts: Seconds, serial: u64) {
        self.clock.set(pts, serial);
    }

    /// Like `set_clock`, for a presentation that happened at `at`
    pub fn set_clock_at(&self, pts: Seconds, serial: u64, at: Instant) {
        self.clock.set_at(pts, serial, at);
    }

    /// Freeze or resume the stream clock
    pub fn set_paused(&self, paused: bool) {
        self.clock.set_paused(paused);
    }

    /// Re-stamp the clock with the queue's current generation.
    /// Keeps the shown time when the clock is still readable, else restarts at zero.
    pub fn sync_serial_clock(&self) {
        let serial = self.queue.serial();
        let pts = self.clock.get().unwrap_or(0.0);
        self.clock.set(pts, serial);
    }

    /// Buffered media in seconds
    pub fn buffered_seconds(&self) -> Seconds {
        self.queue.duration_seconds()
    }

    /// End playback of this stream: abort its queue and disable it
    pub fn close(&self) {
        self.queue.abort();
        self.set_enabled(false);
        tracing::debug!(kind = %self.kind, index = self.index, "stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Packet;

    fn stream(kind: StreamKind) -> Stream {
        Stream::new(kind, 1, TimeBase::MILLIS, QueueLimits::default())
    }

    #[test]
    fn test_new_stream() {
        let s = stream(StreamKind::Video);
        assert_eq!(s.kind(), StreamKind::Video);
        assert_eq!(s.index(), 1);
        assert!(s.is_enabled());
        assert_eq!(s.get_clock(), None);
        assert_eq!(s.time_base(), TimeBase::MILLIS);
    }

    #[test]
    fn test_clock_follows_queue_generation() {
        let s = stream(StreamKind::Audio);
        s.set_clock(2.0, s.queue().serial());
        assert!(s.get_clock().is_some());

        s.queue().flush();
        assert_eq!(s.get_clock(), None);

        s.sync_serial_clock();
        assert_eq!(s.clock().serial(), 1);
        assert!(s.get_clock().is_some());
    }

    #[test]
    fn test_buffered_seconds() {
        let s = stream(StreamKind::Audio);
        for i in 0..5 {
            s.queue().push(Packet::new(1, Some(i * 20), None, 20, vec![0; 4])).unwrap();
        }
        assert!((s.buffered_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_close() {
        let s = stream(StreamKind::Video);
        s.close();
        assert!(!s.is_enabled());
        assert!(s.queue().is_aborted());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(StreamKind::Audio.to_string(), "audio");
        assert_eq!(StreamKind::Video.to_string(), "video");
    }
}
