//! Write-order tokens and flush coordination.
//!
//! Every base-table write runs under a [`WriteOrderToken`]; the index writes
//! it triggers reuse the same token. A flush issues a [`WriteBarrier`] and
//! waits until every token started before the barrier has been released, so
//! base and index tables agree on which writes precede the flush.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct OrderState {
    epoch: u64,
    /// Outstanding tokens per epoch.
    active: BTreeMap<u64, usize>,
}

#[derive(Debug, Default)]
struct OrderShared {
    state: Mutex<OrderState>,
    released: Condvar,
}

/// Groups writes into epochs separated by flush barriers.
///
/// Shared by a base table and its index tables.
#[derive(Debug, Clone, Default)]
pub struct WriteOrder {
    shared: Arc<OrderShared>,
}

impl WriteOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a write in the current epoch.
    pub fn start(&self) -> WriteOrderToken {
        let mut state = self.shared.state.lock();
        let epoch = state.epoch;
        *state.active.entry(epoch).or_insert(0) += 1;
        WriteOrderToken {
            epoch,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close the current epoch. Writes started afterwards fall after the
    /// returned barrier.
    pub fn barrier(&self) -> WriteBarrier {
        let mut state = self.shared.state.lock();
        state.epoch += 1;
        WriteBarrier {
            epoch: state.epoch,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.shared.state.lock().epoch
    }
}

/// Marks one in-flight write. Released on drop.
#[derive(Debug)]
pub struct WriteOrderToken {
    epoch: u64,
    shared: Arc<OrderShared>,
}

impl WriteOrderToken {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether this write precedes `barrier`.
    pub fn is_before(&self, barrier: &WriteBarrier) -> bool {
        self.epoch < barrier.epoch
    }
}

impl Drop for WriteOrderToken {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if let Some(count) = state.active.get_mut(&self.epoch) {
            *count -= 1;
            if *count == 0 {
                state.active.remove(&self.epoch);
            }
        }
        self.shared.released.notify_all();
    }
}

/// A flush boundary.
#[derive(Debug, Clone)]
pub struct WriteBarrier {
    epoch: u64,
    shared: Arc<OrderShared>,
}

impl WriteBarrier {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether every write started before the barrier has finished.
    pub fn is_complete(&self) -> bool {
        let state = self.shared.state.lock();
        Self::drained(&state, self.epoch)
    }

    /// Block until every write started before the barrier has finished.
    pub fn await_completion(&self) {
        let mut state = self.shared.state.lock();
        while !Self::drained(&state, self.epoch) {
            self.shared.released.wait(&mut state);
        }
    }

    fn drained(state: &OrderState, epoch: u64) -> bool {
        state.active.range(..epoch).next().is_none()
    }
}

/// The base table's write-tracking lock.
///
/// Flushes of a base table and of its indexes are issued while holding it, so
/// their memtable switches are ordered. It is only held while a flush is
/// being issued, never while waiting for one.
#[derive(Debug, Default)]
pub struct WriteTracker {
    lock: Mutex<()>,
}

impl WriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `issue` while holding the lock.
    pub fn issue<T>(&self, issue: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock();
        issue()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_barrier_waits_for_earlier_tokens() {
        let order = WriteOrder::new();
        let token = order.start();
        let barrier = order.barrier();
        let later = order.start();

        assert!(token.is_before(&barrier));
        assert!(!later.is_before(&barrier));
        assert!(!barrier.is_complete());

        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.await_completion())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(token);
        waiter.join().unwrap();
        assert!(barrier.is_complete());
        // Tokens after the barrier never hold it up.
        drop(later);
    }

    #[test]
    fn test_empty_barrier_is_complete() {
        let order = WriteOrder::new();
        assert!(order.barrier().is_complete());
        assert_eq!(order.current_epoch(), 1);
    }

    #[test]
    fn test_tracker_is_released_after_issue() {
        let tracker = WriteTracker::new();
        let held = tracker.issue(|| tracker.is_locked());
        assert!(held);
        assert!(!tracker.is_locked());
    }
}
