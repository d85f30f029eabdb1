//! Buffering readiness and producer backpressure.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::atomic::AtomicCell;

use crate::core::config::{GateConfig, SessionConfig};
use crate::stream::Stream;

/// Decides when streams hold enough data to play, and when the demuxer should pause reading
pub struct BufferGate {
    config: AtomicCell<GateConfig>,
    infinite_buffer: AtomicBool,
}

impl BufferGate {
    /// Gate with the session's thresholds and infinite-buffer policy
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: AtomicCell::new(config.gate),
            infinite_buffer: AtomicBool::new(config.infinite_buffer),
        }
    }

    /// Current readiness thresholds
    pub fn config(&self) -> GateConfig {
        self.config.load()
    }

    /// Replace the thresholds at runtime
    pub fn set_config(&self, config: GateConfig) {
        self.config.store(config);
    }

    /// Whether throttling is disabled
    pub fn infinite_buffer(&self) -> bool {
        self.infinite_buffer.load(Ordering::Relaxed)
    }

    /// Toggle throttling for realtime sources
    pub fn set_infinite_buffer(&self, enabled: bool) {
        self.infinite_buffer.store(enabled, Ordering::Relaxed);
    }

    /// Whether `stream` can start or keep playing without waiting for more data.
    /// Queues whose packets carry no duration only need the packet count.
    pub fn has_enough_packets(&self, stream: &Stream) -> bool {
        if !stream.is_enabled() {
            return true;
        }
        let queue = stream.queue();
        if queue.is_aborted() {
            return true;
        }
        let config = self.config.load();
        let duration = queue.duration();
        queue.nb_packets() >= config.minimum_frames
            && (duration == 0 || stream.time_base().ticks_to_seconds(duration) > config.min_duration)
    }

    /// Start gate: every stream is ready
    pub fn all_ready<'a, I>(&self, streams: I) -> bool
    where
        I: IntoIterator<Item = &'a Stream>,
    {
        streams.into_iter().all(|stream| self.has_enough_packets(stream))
    }

    /// Whether the demuxer should stop reading for now.
    ///
    /// True when any enabled queue is over its own limits, when the queues
    /// together hold more than `max_queue_bytes`, or when every stream has
    /// enough buffered. Never throttles with an infinite buffer, or when there
    /// is no stream to protect.
    pub fn should_throttle<'a, I>(&self, streams: I) -> bool
    where
        I: IntoIterator<Item = &'a Stream>,
    {
        if self.infinite_buffer() {
            return false;
        }
        let config = self.config.load();
        let mut total_bytes = 0usize;
        let mut any = false;
        let mut all_enough = true;

        for stream in streams {
            any = true;
            let queue = stream.queue();
            if stream.is_enabled() && !queue.is_aborted() && queue.is_full() {
                tracing::trace!(kind = %stream.kind(), bytes = queue.byte_size(), "queue over its limits");
                return true;
            }
            total_bytes += queue.byte_size();
            all_enough &= self.has_enough_packets(stream);
        }

        any && (total_bytes > config.max_queue_bytes || all_enough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QueueLimits;
    use crate::core::time::TimeBase;
    use crate::queue::Packet;
    use crate::stream::StreamKind;

    fn stream_with(count: usize, duration_ms: i64) -> Stream {
        let stream = Stream::new(StreamKind::Video, 0, TimeBase::MILLIS, QueueLimits::default());
        for i in 0..count {
            let pts = i as i64 * duration_ms;
            stream
                .queue()
                .push(Packet::new(0, Some(pts), Some(pts), duration_ms, vec![0; 1000]))
                .unwrap();
        }
        stream
    }

    fn gate() -> BufferGate {
        BufferGate::new(&SessionConfig::default())
    }

    #[test]
    fn test_minimum_frames() {
        let gate = gate();
        assert!(!gate.has_enough_packets(&stream_with(24, 50)));
        assert!(gate.has_enough_packets(&stream_with(25, 50)));
    }

    #[test]
    fn test_duration_must_exceed_minimum() {
        let gate = gate();
        // 25 x 40ms is exactly one second, not more
        assert!(!gate.has_enough_packets(&stream_with(25, 40)));
        assert!(gate.has_enough_packets(&stream_with(26, 40)));
    }

    #[test]
    fn test_unknown_durations_count_packets_only() {
        let gate = gate();
        assert!(gate.has_enough_packets(&stream_with(25, 0)));
    }

    #[test]
    fn test_closed_queue_is_ready() {
        let gate = gate();
        let stream = stream_with(3, 50);
        stream.queue().close();
        assert!(gate.has_enough_packets(&stream));
    }

    #[test]
    fn test_disabled_stream_is_ready() {
        let gate = gate();
        let stream = stream_with(0, 50);
        stream.set_enabled(false);
        assert!(gate.has_enough_packets(&stream));
    }

    #[test]
    fn test_all_ready() {
        let gate = gate();
        let audio = stream_with(30, 50);
        let video = stream_with(10, 50);
        assert!(!gate.all_ready([&audio, &video]));

        video.close();
        assert!(gate.all_ready([&audio, &video]));
    }

    #[test]
    fn test_throttle_when_all_have_enough() {
        let gate = gate();
        let audio = stream_with(30, 50);
        let video = stream_with(30, 50);
        assert!(gate.should_throttle([&audio, &video]));

        let starving = stream_with(2, 50);
        assert!(!gate.should_throttle([&audio, &starving]));
    }

    #[test]
    fn test_throttle_on_total_bytes() {
        let gate = gate();
        gate.set_config(GateConfig {
            max_queue_bytes: 5_000,
            ..GateConfig::default()
        });
        let audio = stream_with(3, 50);
        let video = stream_with(3, 50);
        assert!(gate.should_throttle([&audio, &video]));
    }

    #[test]
    fn test_throttle_when_one_queue_over_limit() {
        let gate = gate();
        let limits = QueueLimits { max_duration: 2.0, ..QueueLimits::default() };
        let audio = Stream::new(StreamKind::Audio, 1, TimeBase::MILLIS, limits);
        for i in 0..200 {
            audio.queue().push(Packet::new(1, Some(i * 50), Some(i * 50), 50, vec![0; 100])).unwrap();
        }
        let video = stream_with(1, 50);

        assert!(audio.queue().is_full());
        assert!(!gate.has_enough_packets(&video));
        assert!(gate.should_throttle([&audio, &video]));

        // The queue's own infinite-buffer policy lifts its limit
        audio.queue().set_infinite_buffer(true);
        assert!(!gate.should_throttle([&audio, &video]));
    }

    #[test]
    fn test_full_disabled_stream_does_not_throttle() {
        let gate = gate();
        let limits = QueueLimits { max_bytes: 500, ..QueueLimits::default() };
        let audio = Stream::new(StreamKind::Audio, 1, TimeBase::MILLIS, limits);
        audio.queue().push(Packet::new(1, Some(0), Some(0), 50, vec![0; 1000])).unwrap();
        audio.set_enabled(false);
        let video = stream_with(1, 50);
        assert!(!gate.should_throttle([&audio, &video]));
    }

    #[test]
    fn test_infinite_buffer_never_throttles() {
        let gate = gate();
        gate.set_infinite_buffer(true);
        let audio = stream_with(30, 50);
        assert!(!gate.should_throttle([&audio]));
    }

    #[test]
    fn test_no_streams_never_throttles() {
        let gate = gate();
        assert!(!gate.should_throttle(std::iter::empty::<&Stream>()));
    }

    #[test]
    fn test_configurable_minimum() {
        let gate = gate();
        gate.set_config(GateConfig {
            minimum_frames: 5,
            min_duration: 0.1,
            ..GateConfig::default()
        });
        assert!(gate.has_enough_packets(&stream_with(5, 50)));
    }
}
