use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Binary semaphore with a maximum count of one.
///
/// Used as a rendezvous between the byte-delivery context and the endpoint
/// thread: giving an already-given completion has no further effect.
#[derive(Debug, Default)]
pub struct Completion {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the completion, waking one waiter.
    pub fn give(&self) {
        let mut ready = self.lock();
        *ready = true;
        self.cond.notify_one();
    }

    /// Block until the completion is given, then consume it.
    pub fn take(&self) {
        let mut ready = self.lock();
        while !*ready {
            ready = self.cond.wait(ready).unwrap_or_else(PoisonError::into_inner);
        }
        *ready = false;
    }

    /// Block until the completion is given or `timeout` elapses.
    ///
    /// Returns `true` if the completion was consumed.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        let ready = self.lock();
        let (mut ready, _) = self
            .cond
            .wait_timeout_while(ready, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *ready, false)
    }

    /// Consume the completion if it is given, without blocking.
    pub fn try_take(&self) -> bool {
        std::mem::replace(&mut *self.lock(), false)
    }

    /// Whether the completion is currently given.
    pub fn is_given(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn give_then_take() {
        let done = Completion::new();
        done.give();
        assert!(done.is_given());
        assert!(done.take_timeout(Duration::from_millis(1)));
        assert!(!done.is_given());
    }

    #[test]
    fn count_saturates_at_one() {
        let done = Completion::new();
        done.give();
        done.give();
        assert!(done.try_take());
        assert!(!done.try_take());
    }

    #[test]
    fn take_timeout_expires() {
        let done = Completion::new();
        let start = Instant::now();
        assert!(!done.take_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wakes_blocked_waiter() {
        let done = Arc::new(Completion::new());
        let waiter = {
            let done = Arc::clone(&done);
            thread::spawn(move || done.take())
        };
        thread::sleep(Duration::from_millis(10));
        done.give();
        waiter.join().unwrap();
        assert!(!done.is_given());
    }
}
