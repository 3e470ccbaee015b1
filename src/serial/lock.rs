use core::sync::atomic::{AtomicBool, Ordering};

/// Binary lock with non-blocking acquisition
///
/// Guards the right to start a transfer. It is acquired by the sender and
/// released from the transfer completion interrupt, so it never blocks: a
/// failed [`TransferLock::try_acquire`] means "busy", the caller decides
/// whether to drop, retry or buffer its data.
#[derive(Debug, Default)]
pub struct TransferLock {
    held: AtomicBool,
}

impl TransferLock {
    pub const fn new() -> Self {
        Self { held: AtomicBool::new(false) }
    }

    /// Try to take the lock, returns true if it was free
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock
    ///
    /// Must only be called by the owner of a successful [`Self::try_acquire`].
    pub fn release(&self) {
        let was_held = self.held.swap(false, Ordering::Release);
        debug_assert!(was_held, "Releasing transfer lock that is not held");
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}
