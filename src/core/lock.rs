//! Mutual exclusion handed to an external codec library.
//!
//! Codec libraries that serialize their own global state across decoder threads
//! ask the host for locks through a create/acquire/release/destroy callback.
//! Acquire and release arrive as separate calls, so no guard can span them.

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

/// Lock provider injected at the decoder boundary
pub trait LockManager: Send + Sync {
    type Lock: Send + Sync;

    /// Allocate a new unlocked lock
    fn create(&self) -> Self::Lock;

    /// Block until the lock is held by the caller
    fn acquire(&self, lock: &Self::Lock);

    /// Release a lock previously acquired. Returns false if it was not held.
    fn release(&self, lock: &Self::Lock) -> bool;

    /// Dispose of a lock that nobody holds
    fn destroy(&self, lock: Self::Lock);
}

/// Default provider backed by `parking_lot::RawMutex`
#[derive(Debug, Default, Clone, Copy)]
pub struct RawMutexLockManager;

impl LockManager for RawMutexLockManager {
    type Lock = Box<RawMutex>;

    fn create(&self) -> Self::Lock {
        Box::new(RawMutex::INIT)
    }

    fn acquire(&self, lock: &Self::Lock) {
        lock.lock();
    }

    fn release(&self, lock: &Self::Lock) -> bool {
        if !lock.is_locked() {
            tracing::warn!("codec lock released while not held");
            return false;
        }
        // SAFETY: the codec library only releases locks it acquired through
        // `acquire` on the same manager; the is_locked check above rejects
        // stray releases.
        unsafe { lock.unlock() };
        true
    }

    fn destroy(&self, lock: Self::Lock) {
        if lock.is_locked() {
            tracing::warn!("codec lock destroyed while held");
        }
        drop(lock);
    }
}
