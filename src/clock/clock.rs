//! Presentation clock of one stream, or the free-running external clock.
//!
//! Readers load a consistent copy of the clock state through an `AtomicCell`
//! (which falls back to crossbeam's internal striped lock for a state this
//! large) and never touch the writer mutex. Writers serialize on that mutex so
//! read-modify-write updates (pause, speed) are never interleaved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use crate::core::time::Seconds;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    pts: Seconds,
    last_updated: Instant,
    speed: f64,
    serial: u64,
    paused: bool,
    valid: bool,
}

impl ClockState {
    /// Value the clock shows at `now`, ignoring staleness
    fn value_at(&self, now: Instant) -> Seconds {
        if self.paused {
            self.pts
        } else {
            let elapsed = now.saturating_duration_since(self.last_updated).as_secs_f64();
            self.pts + elapsed * self.speed
        }
    }
}

/// Presentation clock in seconds
pub struct Clock {
    state: AtomicCell<ClockState>,
    write_lock: Mutex<()>,
    /// Serial of the owning queue; `None` for clocks not tied to a queue
    queue_serial: Option<Arc<AtomicU64>>,
}

impl Clock {
    /// Clock tied to a packet queue's generation
    pub fn new(queue_serial: Arc<AtomicU64>) -> Self {
        Self::with_queue_serial(Some(queue_serial))
    }

    /// Free-running clock, started at `pts` now
    pub fn external(pts: Seconds) -> Self {
        let clock = Self::with_queue_serial(None);
        clock.set(pts, 0);
        clock
    }

    fn with_queue_serial(queue_serial: Option<Arc<AtomicU64>>) -> Self {
        Self {
            state: AtomicCell::new(ClockState {
                pts: 0.0,
                last_updated: Instant::now(),
                speed: 1.0,
                serial: 0,
                paused: false,
                valid: false,
            }),
            write_lock: Mutex::new(()),
            queue_serial,
        }
    }

    /// Current time, or `None` if never set or stale relative to the queue
    pub fn get(&self) -> Option<Seconds> {
        let state = self.state.load();
        if !self.is_current(&state) {
            return None;
        }
        Some(state.value_at(Instant::now()))
    }

    fn is_current(&self, state: &ClockState) -> bool {
        if !state.valid {
            return false;
        }
        match &self.queue_serial {
            Some(serial) => serial.load(Ordering::Acquire) == state.serial,
            None => true,
        }
    }

    /// Set the clock to `pts` as of now
    pub fn set(&self, pts: Seconds, serial: u64) {
        self.set_at(pts, serial, Instant::now());
    }

    /// Set the clock to `pts` as of `at` (e.g. when the audio device consumed the sample)
    pub fn set_at(&self, pts: Seconds, serial: u64, at: Instant) {
        let _guard = self.write_lock.lock();
        let mut state = self.state.load();
        state.pts = pts;
        state.last_updated = at;
        state.serial = serial;
        state.valid = !pts.is_nan();
        self.state.store(state);
    }

    /// Stop or resume wall-time advancement.
    /// The shown time is frozen on pause and paused time is never counted.
    pub fn set_paused(&self, paused: bool) {
        let _guard = self.write_lock.lock();
        let mut state = self.state.load();
        if state.paused == paused {
            return;
        }
        let now = Instant::now();
        state.pts = state.value_at(now);
        state.last_updated = now;
        state.paused = paused;
        self.state.store(state);
    }

    /// Change the playback rate without a jump in the shown time
    pub fn set_speed(&self, speed: f64) {
        let _guard = self.write_lock.lock();
        let mut state = self.state.load();
        let now = Instant::now();
        state.pts = state.value_at(now);
        state.last_updated = now;
        state.speed = speed;
        self.state.store(state);
    }

    /// Copy time and serial from `other`. Returns false if `other` has nothing to copy.
    /// A clock bound to a queue takes that queue's current serial instead,
    /// since its staleness is judged against its own queue.
    pub fn sync_to(&self, other: &Clock) -> bool {
        let source = other.state.load();
        if !other.is_current(&source) {
            return false;
        }
        let serial = match &self.queue_serial {
            Some(queue_serial) => queue_serial.load(Ordering::Acquire),
            None => source.serial,
        };
        let now = Instant::now();
        self.set_at(source.value_at(now), serial, now);
        true
    }

    pub fn serial(&self) -> u64 {
        self.state.load().serial
    }

    /// Whether the clock is frozen
    pub fn is_paused(&self) -> bool {
        self.state.load().paused
    }

    /// Playback rate
    pub fn speed(&self) -> f64 {
        self.state.load().speed
    }

    /// Wall instant of the last set
    pub fn last_updated(&self) -> Instant {
        self.state.load().last_updated
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load();
        f.debug_struct("Clock")
            .field("pts", &state.pts)
            .field("serial", &state.serial)
            .field("paused", &state.paused)
            .field("speed", &state.speed)
            .field("current", &self.is_current(&state))
            .finish()
    }
}
