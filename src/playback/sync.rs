//! Audio/video synchronization controller.
//! Picks the master clock per decision and turns frame drift into a verdict.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::core::config::{SessionConfig, SyncMode, SyncThresholds};
use crate::core::error::SyncError;
use crate::core::time::Seconds;
use crate::stream::{Stream, StreamKind};

/// What the presenter should do with a decoded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    DisplayNow,
    /// Delay presentation by this many seconds
    Wait(Seconds),
    Drop,
}

/// Clock a decision was measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterSource {
    Audio,
    Video,
    External,
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub displayed: u64,
    pub waited: u64,
    pub dropped: u64,
    /// Decisions that fell back to the external clock
    pub fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    displayed: AtomicU64,
    waited: AtomicU64,
    dropped: AtomicU64,
    fallbacks: AtomicU64,
}

/// Synchronization controller for one playback session.
/// Reads stream clocks; only mutates them through `Clock::sync_to`.
pub struct SyncController {
    audio: RwLock<Option<Arc<Stream>>>,
    video: RwLock<Option<Arc<Stream>>>,
    external: Clock,
    mode: AtomicCell<SyncMode>,
    thresholds: AtomicCell<SyncThresholds>,
    framedrop: AtomicBool,
    fell_back: AtomicBool,
    counters: Counters,
}

impl SyncController {
    /// Create a controller with no streams; the external clock starts at zero
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            audio: RwLock::new(None),
            video: RwLock::new(None),
            external: Clock::external(0.0),
            mode: AtomicCell::new(config.sync_mode),
            thresholds: AtomicCell::new(config.thresholds),
            framedrop: AtomicBool::new(config.framedrop),
            fell_back: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Register a stream, replacing any previous stream of the same kind
    pub fn attach(&self, stream: Arc<Stream>) {
        let slot = self.slot(stream.kind());
        *slot.write() = Some(stream);
    }

    /// Forget the stream of `kind`, returning it
    pub fn detach(&self, kind: StreamKind) -> Option<Arc<Stream>> {
        self.slot(kind).write().take()
    }

    fn slot(&self, kind: StreamKind) -> &RwLock<Option<Arc<Stream>>> {
        match kind {
            StreamKind::Audio => &self.audio,
            StreamKind::Video => &self.video,
        }
    }

    fn enabled(&self, kind: StreamKind) -> Option<Arc<Stream>> {
        self.slot(kind)
            .read()
            .as_ref()
            .filter(|stream| stream.is_enabled())
            .cloned()
    }

    /// Requested sync mode
    pub fn mode(&self) -> SyncMode {
        self.mode.load()
    }

    /// Change the sync mode; takes effect on the next decision
    pub fn set_mode(&self, mode: SyncMode) {
        let previous = self.mode.swap(mode);
        if previous != mode {
            tracing::info!(?previous, ?mode, "sync mode changed");
        }
    }

    /// Current drift thresholds
    pub fn thresholds(&self) -> SyncThresholds {
        self.thresholds.load()
    }

    /// Replace the drift thresholds at runtime
    pub fn set_thresholds(&self, thresholds: SyncThresholds) {
        self.thresholds.store(thresholds);
    }

    /// Whether late frames may be dropped
    pub fn framedrop(&self) -> bool {
        self.framedrop.load(Ordering::Relaxed)
    }

    /// Enable or disable dropping late frames
    pub fn set_framedrop(&self, enabled: bool) {
        self.framedrop.store(enabled, Ordering::Relaxed);
    }

    /// Stream whose clock the current mode asks for.
    /// `Ok(None)` means the external clock was requested.
    fn requested_master(&self) -> Result<Option<Arc<Stream>>, SyncError> {
        let mode = self.mode();
        let kind = match mode {
            SyncMode::AudioMaster => StreamKind::Audio,
            SyncMode::VideoMaster => StreamKind::Video,
            SyncMode::ExternalClock => return Ok(None),
        };
        self.enabled(kind).map(Some).ok_or(SyncError::NoMasterClock(mode))
    }

    /// Resolve the master, falling back to the external clock when needed
    fn resolve_master(&self) -> Option<Arc<Stream>> {
        match self.requested_master() {
            Ok(stream) => {
                if self.fell_back.swap(false, Ordering::Relaxed) {
                    tracing::debug!("master clock restored");
                }
                stream
            }
            Err(err) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                if !self.fell_back.swap(true, Ordering::Relaxed) {
                    tracing::debug!(%err, "falling back to external clock");
                }
                None
            }
        }
    }

    fn source_of(stream: Option<&Arc<Stream>>) -> MasterSource {
        match stream.map(|s| s.kind()) {
            Some(StreamKind::Audio) => MasterSource::Audio,
            Some(StreamKind::Video) => MasterSource::Video,
            None => MasterSource::External,
        }
    }

    /// Which clock decisions are currently measured against
    pub fn master_source(&self) -> MasterSource {
        Self::source_of(self.resolve_master().as_ref())
    }

    /// Current master time for on-screen display, `None` while the master is stale
    pub fn master_clock_value(&self) -> Option<Seconds> {
        match self.resolve_master() {
            Some(stream) => stream.get_clock(),
            None => self.external.get(),
        }
    }

    pub fn external_clock(&self) -> &Clock {
        &self.external
    }

    /// Restart the external clock, e.g. at a seek target
    pub fn set_external_clock(&self, pts: Seconds) {
        self.external.set(pts, self.external.serial() + 1);
    }

    /// Pause or resume the external clock
    pub fn set_paused(&self, paused: bool) {
        self.external.set_paused(paused);
    }

    /// Decide what to do with a frame due at `frame_pts`.
    ///
    /// `queue_backlog` is the number of frames or packets still waiting behind
    /// this one; dropping is only worthwhile while there is something to catch
    /// up with. Waits are capped at `max_wait`, or at `predicted_frame_duration`
    /// when the frame is longer than that.
    pub fn compute_delay(
        &self,
        frame_pts: Seconds,
        predicted_frame_duration: Seconds,
        queue_backlog: usize,
    ) -> Verdict {
        let thresholds = self.thresholds.load();
        let master_time = match self.master_clock_value() {
            Some(time) => time,
            None => {
                // No timing information yet
                self.counters.displayed.fetch_add(1, Ordering::Relaxed);
                return Verdict::DisplayNow;
            }
        };

        let diff = frame_pts - master_time;
        if !diff.is_finite() {
            self.counters.displayed.fetch_add(1, Ordering::Relaxed);
            return Verdict::DisplayNow;
        }

        if diff < -thresholds.sync_threshold_max
            && queue_backlog > thresholds.low_latency_backlog
            && self.framedrop()
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(frame_pts, diff, queue_backlog, "dropping late frame");
            return Verdict::Drop;
        }

        if diff >= -thresholds.sync_threshold_min && diff <= thresholds.sync_threshold_max {
            self.counters.displayed.fetch_add(1, Ordering::Relaxed);
            return Verdict::DisplayNow;
        }

        // Frames that last longer than the cap (stills, slides) may still be waited for
        let wait_cap = if predicted_frame_duration.is_finite() {
            thresholds.max_wait.max(predicted_frame_duration)
        } else {
            thresholds.max_wait
        };
        let wait = diff.min(wait_cap);
        if wait <= 0.0 {
            // Late, but not eligible for dropping
            self.counters.displayed.fetch_add(1, Ordering::Relaxed);
            Verdict::DisplayNow
        } else {
            self.counters.waited.fetch_add(1, Ordering::Relaxed);
            Verdict::Wait(wait)
        }
    }

    /// Pull clocks that do not drive playback back onto the master.
    /// A slave is re-synced when stale or further than `no_sync_threshold` away.
    pub fn sync_slave_clocks(&self) {
        let master = self.resolve_master();
        let master_clock = match &master {
            Some(stream) => stream.clock(),
            None => &self.external,
        };
        let master_time = match master_clock.get() {
            Some(time) => time,
            None => return,
        };
        let no_sync = self.thresholds.load().no_sync_threshold;

        let needs_sync = |slave: &Clock| match slave.get() {
            Some(time) => (time - master_time).abs() > no_sync,
            None => true,
        };

        for kind in [StreamKind::Audio, StreamKind::Video] {
            if let Some(stream) = self.enabled(kind) {
                let is_master = master.as_ref().map_or(false, |m| m.kind() == kind);
                if !is_master && needs_sync(stream.clock()) {
                    tracing::trace!(%kind, master_time, "re-syncing slave clock");
                    stream.clock().sync_to(master_clock);
                }
            }
        }

        if master.is_some() && needs_sync(&self.external) {
            self.external.sync_to(master_clock);
        }
    }

    /// Snapshot of the diagnostic counters
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            displayed: self.counters.displayed.load(Ordering::Relaxed),
            waited: self.counters.waited.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QueueLimits;
    use crate::core::time::TimeBase;

    fn stream(kind: StreamKind) -> Arc<Stream> {
        Arc::new(Stream::new(kind, 0, TimeBase::MILLIS, QueueLimits::default()))
    }

    /// Controller whose audio master is frozen at `master_pts`
    fn controller_at(master_pts: Seconds, framedrop: bool) -> (SyncController, Arc<Stream>) {
        let config = SessionConfig {
            framedrop,
            ..SessionConfig::default()
        };
        let controller = SyncController::new(&config);
        let audio = stream(StreamKind::Audio);
        audio.set_clock(master_pts, 0);
        audio.set_paused(true);
        controller.attach(Arc::clone(&audio));
        (controller, audio)
    }

    fn assert_wait(verdict: Verdict, expected: Seconds) {
        match verdict {
            Verdict::Wait(secs) => assert!((secs - expected).abs() < 1e-3, "waited {}", secs),
            other => panic!("expected Wait({}), got {:?}", expected, other),
        }
    }

    #[test]
    fn test_early_frame_waits() {
        let (controller, _audio) = controller_at(10.0, false);
        assert_wait(controller.compute_delay(10.5, 0.04, 0), 0.5);
    }

    #[test]
    fn test_frame_in_window_displays() {
        let (controller, _audio) = controller_at(10.0, false);
        assert_eq!(controller.compute_delay(10.02, 0.04, 0), Verdict::DisplayNow);
        assert_eq!(controller.compute_delay(9.97, 0.04, 0), Verdict::DisplayNow);
        assert_eq!(controller.compute_delay(10.1, 0.04, 0), Verdict::DisplayNow);
    }

    #[test]
    fn test_late_frame_dropped_with_backlog() {
        let (controller, _audio) = controller_at(10.0, true);
        assert_eq!(controller.compute_delay(9.0, 0.04, 5), Verdict::Drop);
        assert_eq!(controller.stats().dropped, 1);
    }

    #[test]
    fn test_late_frame_kept_without_backlog_or_framedrop() {
        let (controller, _audio) = controller_at(10.0, true);
        assert_eq!(controller.compute_delay(9.0, 0.04, 0), Verdict::DisplayNow);

        controller.set_framedrop(false);
        assert_eq!(controller.compute_delay(9.0, 0.04, 5), Verdict::DisplayNow);
        assert_eq!(controller.stats().dropped, 0);
    }

    #[test]
    fn test_late_bound_ignores_frame_duration() {
        let (controller, _audio) = controller_at(10.0, true);
        // 0.3s late is past sync_threshold_max however long the frame lasts
        assert_eq!(controller.compute_delay(9.7, 0.5, 5), Verdict::Drop);
        assert_eq!(controller.compute_delay(9.7, 0.04, 5), Verdict::Drop);
        // Inside the late bound a frame is never dropped
        assert_eq!(controller.compute_delay(9.95, 0.5, 5), Verdict::DisplayNow);
        assert_eq!(controller.stats().dropped, 2);
    }

    #[test]
    fn test_long_frame_extends_wait_cap() {
        let (controller, _audio) = controller_at(10.0, false);
        assert_wait(controller.compute_delay(25.0, 12.0, 0), 12.0);
        assert_wait(controller.compute_delay(25.0, f64::NAN, 0), 10.0);
    }

    #[test]
    fn test_wait_is_clamped() {
        let (controller, _audio) = controller_at(10.0, false);
        assert_wait(controller.compute_delay(500.0, 0.04, 0), 10.0);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let (controller, _audio) = controller_at(10.0, false);
        controller.set_thresholds(SyncThresholds {
            sync_threshold_max: 1.0,
            ..SyncThresholds::default()
        });
        assert_eq!(controller.compute_delay(10.5, 0.04, 0), Verdict::DisplayNow);
    }

    #[test]
    fn test_unset_master_displays() {
        let controller = SyncController::new(&SessionConfig::default());
        controller.attach(stream(StreamKind::Audio));
        assert_eq!(controller.compute_delay(3.0, 0.04, 0), Verdict::DisplayNow);
    }

    #[test]
    fn test_master_selection() {
        let controller = SyncController::new(&SessionConfig::default());
        let audio = stream(StreamKind::Audio);
        let video = stream(StreamKind::Video);
        controller.attach(Arc::clone(&audio));
        controller.attach(Arc::clone(&video));

        assert_eq!(controller.master_source(), MasterSource::Audio);
        controller.set_mode(SyncMode::VideoMaster);
        assert_eq!(controller.master_source(), MasterSource::Video);
        controller.set_mode(SyncMode::ExternalClock);
        assert_eq!(controller.master_source(), MasterSource::External);
        assert_eq!(controller.stats().fallbacks, 0);
    }

    #[test]
    fn test_falls_back_without_master_stream() {
        let controller = SyncController::new(&SessionConfig::default());
        let video = stream(StreamKind::Video);
        controller.attach(Arc::clone(&video));

        // Audio requested, none attached
        assert_eq!(controller.master_source(), MasterSource::External);

        // Disabled streams don't count either
        controller.set_mode(SyncMode::VideoMaster);
        video.set_enabled(false);
        assert_eq!(controller.master_source(), MasterSource::External);
        assert_eq!(controller.stats().fallbacks, 2);

        video.set_enabled(true);
        assert_eq!(controller.master_source(), MasterSource::Video);
    }

    #[test]
    fn test_external_master_ignores_streams() {
        let config = SessionConfig {
            sync_mode: SyncMode::ExternalClock,
            ..SessionConfig::default()
        };
        let controller = SyncController::new(&config);
        let audio = stream(StreamKind::Audio);
        audio.set_clock(100.0, 0);
        controller.attach(audio);

        controller.set_external_clock(10.0);
        controller.set_paused(true);
        assert_wait(controller.compute_delay(10.5, 0.04, 0), 0.5);
    }

    #[test]
    fn test_sync_slave_clocks() {
        let (controller, _audio) = controller_at(20.0, false);
        let video = stream(StreamKind::Video);
        controller.attach(Arc::clone(&video));
        assert_eq!(video.get_clock(), None);

        controller.sync_slave_clocks();
        let video_time = video.get_clock().unwrap();
        assert!((video_time - 20.0).abs() < 0.05);
        let external_time = controller.external_clock().get().unwrap();
        assert!((external_time - 20.0).abs() < 0.05);

        // Close enough slaves are left alone
        video.set_clock(21.0, 0);
        controller.sync_slave_clocks();
        assert!(video.get_clock().unwrap() >= 21.0);
    }

    #[test]
    fn test_counters() {
        let (controller, _audio) = controller_at(10.0, true);
        controller.compute_delay(10.0, 0.04, 0);
        controller.compute_delay(10.5, 0.04, 0);
        controller.compute_delay(8.0, 0.04, 3);

        let stats = controller.stats();
        assert_eq!(stats.displayed, 1);
        assert_eq!(stats.waited, 1);
        assert_eq!(stats.dropped, 1);
    }
}
