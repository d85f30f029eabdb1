//! Thread-safe FIFO of compressed packets for one elementary stream.
//!
//! Push never blocks: the queue only reports fullness and the producer decides
//! whether to throttle. Pop can block until data arrives, the queue is flushed
//! under the caller, or the queue is aborted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::config::QueueLimits;
use crate::core::error::QueueError;
use crate::core::time::{Seconds, TimeBase};
use crate::queue::packet::Packet;

/// How long `pop` may wait for data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopMode {
    NonBlocking,
    Blocking,
    Timeout(Duration),
}

/// Result of a successful `pop`
#[derive(Debug, PartialEq, Eq)]
pub enum Popped {
    Packet(Packet),
    /// Nothing queued (non-blocking or timed out)
    Empty,
    /// The caller's serial is stale; resume with the carried serial
    Flushed(u64),
}

#[cfg(test)]
impl Popped {
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Popped::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

struct QueueState {
    packets: VecDeque<Packet>,
    byte_size: usize,
    duration: i64,
    serial: u64,
    aborted: bool,
}

impl QueueState {
    fn take_front(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.byte_size -= packet.size();
        self.duration -= packet.duration;
        self.check_aggregates();
        Some(packet)
    }

    #[inline]
    fn check_aggregates(&self) {
        debug_assert_eq!(
            self.byte_size,
            self.packets.iter().map(Packet::size).sum::<usize>()
        );
        debug_assert_eq!(
            self.duration,
            self.packets.iter().map(|p| p.duration).sum::<i64>()
        );
    }
}

/// Bounded-by-policy packet FIFO with byte/duration accounting
pub struct PacketQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    /// Mirror of the serial for lock-free staleness checks by clocks
    serial: Arc<AtomicU64>,
    time_base: TimeBase,
    limits: QueueLimits,
    infinite_buffer: AtomicBool,
    stale_discarded: AtomicU64,
}

impl PacketQueue {
    /// Create an empty, running queue
    pub fn new(time_base: TimeBase, limits: QueueLimits) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                byte_size: 0,
                duration: 0,
                serial: 0,
                aborted: false,
            }),
            cond: Condvar::new(),
            serial: Arc::new(AtomicU64::new(0)),
            time_base,
            limits,
            infinite_buffer: AtomicBool::new(false),
            stale_discarded: AtomicU64::new(0),
        }
    }

    /// Enqueue a packet stamped with the current serial and wake one consumer
    pub fn push(&self, mut packet: Packet) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(QueueError::Closed);
        }

        packet.serial = state.serial;
        state.byte_size += packet.size();
        state.duration += packet.duration;
        state.packets.push_back(packet);
        state.check_aggregates();
        drop(state);

        self.cond.notify_one();
        Ok(())
    }

    /// Dequeue the oldest packet of generation `expected_serial`.
    ///
    /// `None` accepts whatever generation is current. A caller whose serial is
    /// older than the queue's gets `Popped::Flushed` instead of data, including
    /// when the flush happens while it is blocked.
    pub fn pop(&self, mode: PopMode, expected_serial: Option<u64>) -> Result<Popped, QueueError> {
        // A timeout too large to represent waits like a blocking pop
        let deadline = match mode {
            PopMode::Timeout(timeout) => Instant::now().checked_add(timeout),
            _ => None,
        };
        let mut state = self.state.lock();
        let mut waited = false;

        loop {
            if state.aborted {
                return Err(if waited { QueueError::Aborted } else { QueueError::Closed });
            }

            if let Some(expected) = expected_serial {
                if expected != state.serial {
                    self.stale_discarded.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(expected, current = state.serial, "pop crossed a flush boundary");
                    return Ok(Popped::Flushed(state.serial));
                }
            }

            while let Some(packet) = state.take_front() {
                if packet.serial == state.serial {
                    return Ok(Popped::Packet(packet));
                }
                self.stale_discarded.fetch_add(1, Ordering::Relaxed);
            }

            match mode {
                PopMode::NonBlocking => return Ok(Popped::Empty),
                PopMode::Blocking => self.cond.wait(&mut state),
                PopMode::Timeout(_) => match deadline {
                    Some(deadline) => {
                        if self.cond.wait_until(&mut state, deadline).timed_out()
                            && state.packets.is_empty()
                            && !state.aborted
                        {
                            return Ok(Popped::Empty);
                        }
                    }
                    None => self.cond.wait(&mut state),
                },
            }
            waited = true;
        }
    }

    /// Drop every queued packet and start a new generation
    pub fn flush(&self) -> u64 {
        let mut state = self.state.lock();
        let dropped = state.packets.len();
        state.packets.clear();
        state.byte_size = 0;
        state.duration = 0;
        state.serial += 1;
        self.serial.store(state.serial, Ordering::Release);
        let serial = state.serial;
        drop(state);

        tracing::debug!(serial, dropped, "packet queue flushed");
        // Consumers blocked on the old generation must resolve as flushed
        self.cond.notify_all();
        serial
    }

    /// Make the queue permanently unusable and wake every waiter
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if state.aborted {
            return;
        }
        state.aborted = true;
        drop(state);

        tracing::debug!("packet queue aborted");
        self.cond.notify_all();
    }

    /// Alias of `abort` used at end of session
    pub fn close(&self) {
        self.abort();
    }

    /// Whether `abort` or `close` has been called
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Number of resident packets
    pub fn nb_packets(&self) -> usize {
        self.state.lock().packets.len()
    }

    /// Sum of resident packet durations, in time-base ticks
    pub fn duration(&self) -> i64 {
        self.state.lock().duration
    }

    /// Sum of resident packet durations, in seconds
    pub fn duration_seconds(&self) -> Seconds {
        self.time_base.ticks_to_seconds(self.duration())
    }

    /// Sum of resident payload sizes, in bytes
    pub fn byte_size(&self) -> usize {
        self.state.lock().byte_size
    }

    /// Current generation, bumped by every flush
    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::Acquire)
    }

    /// Shared view of the serial for clocks owned alongside this queue
    pub fn serial_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.serial)
    }

    /// Time base of the packets' durations
    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Count of packets and pops discarded for carrying a stale serial
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded.load(Ordering::Relaxed)
    }

    /// Lift or restore the memory ceiling
    pub fn set_infinite_buffer(&self, enabled: bool) {
        self.infinite_buffer.store(enabled, Ordering::Relaxed);
    }

    /// Whether the memory ceiling is lifted
    pub fn infinite_buffer(&self) -> bool {
        self.infinite_buffer.load(Ordering::Relaxed)
    }

    /// Whether the memory ceiling has been reached. Never true with an infinite buffer.
    pub fn is_full(&self) -> bool {
        if self.infinite_buffer() {
            return false;
        }
        let state = self.state.lock();
        state.byte_size > self.limits.max_bytes
            || self.time_base.ticks_to_seconds(state.duration) > self.limits.max_duration
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PacketQueue")
            .field("nb_packets", &state.packets.len())
            .field("byte_size", &state.byte_size)
            .field("duration", &state.duration)
            .field("serial", &state.serial)
            .field("aborted", &state.aborted)
            .finish()
    }
}
