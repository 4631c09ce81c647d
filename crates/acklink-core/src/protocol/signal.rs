//! Acknowledgment signal shared by the sender and the receive path

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Manual-reset event.
///
/// Once set it stays set until [`clear`](AckSignal::clear) is called, so an
/// acknowledgment that lands between the write and the wait is not lost.
#[derive(Debug, Default)]
pub struct AckSignal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl AckSignal {
    /// Create a cleared signal
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.set.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the signal satisfied and wake all waiters
    pub fn set(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    /// Return the signal to the unsatisfied state
    pub fn clear(&self) {
        *self.lock() = false;
    }

    /// Whether the signal is currently set
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal was set in time.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.lock();
        while !*set {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            set = match self.cond.wait_timeout(set, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_cleared() {
        let signal = AckSignal::new();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_set_before_wait_is_kept() {
        let signal = AckSignal::new();
        signal.set();
        assert!(signal.wait(Duration::from_millis(1)));
        assert!(signal.is_set());

        signal.clear();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_set_from_other_thread_wakes_waiter() {
        let signal = Arc::new(AckSignal::new());
        let setter = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        assert!(signal.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
