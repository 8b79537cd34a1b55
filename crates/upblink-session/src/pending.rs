use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;

/// Single-slot ACK/NAK signal bridging the reader and writer threads.
///
/// This is the only shared state between the two loops. The writer arms the
/// slot immediately before a write attempt and clears it before resolving
/// any terminal outcome; the reader signals into whatever is armed at that
/// moment. The one-shot channel makes every hazardous interleaving a no-op:
/// a signal with nothing armed is discarded, a second signal into a full
/// slot is discarded, and a signal after the writer timed out and dropped
/// its receiver is discarded.
pub(crate) struct PendingAck {
    slot: Mutex<Option<SyncSender<bool>>>,
}

impl PendingAck {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Arm the slot for one write attempt, returning the wait side.
    pub(crate) fn arm(&self) -> Receiver<bool> {
        let (tx, rx) = mpsc::sync_channel(1);
        *self.lock() = Some(tx);
        rx
    }

    /// Disarm the slot. Must precede every terminal resolution so a late
    /// signal can never touch the next command's attempt.
    pub(crate) fn clear(&self) {
        *self.lock() = None;
    }

    /// Deliver an ACK (`true`) or NAK (`false`) to the armed attempt.
    ///
    /// Returns whether anything consumed the signal.
    pub(crate) fn signal(&self, ack: bool) -> bool {
        match self.lock().as_ref() {
            Some(tx) => tx.try_send(ack).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SyncSender<bool>>> {
        // A poisoned slot mutex only means a thread died mid-update; the
        // stored value is a plain Option and remains usable.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn signal_without_pending_write_is_discarded() {
        let pending = PendingAck::new();
        assert!(!pending.signal(true));
        assert!(!pending.signal(false));
    }

    #[test]
    fn armed_slot_receives_one_signal() {
        let pending = PendingAck::new();
        let rx = pending.arm();

        assert!(pending.signal(true));
        assert_eq!(rx.recv_timeout(Duration::from_millis(50)), Ok(true));
    }

    #[test]
    fn second_signal_is_discarded() {
        let pending = PendingAck::new();
        let rx = pending.arm();

        assert!(pending.signal(false));
        assert!(!pending.signal(true), "slot is full; second send is a no-op");
        assert_eq!(rx.recv_timeout(Duration::from_millis(50)), Ok(false));
    }

    #[test]
    fn signal_after_receiver_dropped_is_discarded() {
        let pending = PendingAck::new();
        let rx = pending.arm();
        drop(rx); // writer timed out and moved on

        assert!(!pending.signal(true));
    }

    #[test]
    fn clear_disarms() {
        let pending = PendingAck::new();
        let _rx = pending.arm();
        pending.clear();

        assert!(!pending.signal(true));
    }

    #[test]
    fn rearming_replaces_the_slot() {
        let pending = PendingAck::new();
        let stale = pending.arm();
        let fresh = pending.arm();

        assert!(pending.signal(true));
        assert!(stale.try_recv().is_err(), "stale attempt must see nothing");
        assert_eq!(fresh.recv_timeout(Duration::from_millis(50)), Ok(true));
    }
}
