use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Counts writes that were submitted but have not finished yet.
///
/// Plays the part of a wait group: `add` before handing a buffer over,
/// `done` once the worker is finished with it, `wait` to block until the
/// count drops to zero.
#[derive(Debug, Default)]
pub struct PendingCounter {
    count: Mutex<usize>,
    drained: Condvar,
}

impl PendingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        *self.lock() += 1;
    }

    pub fn done(&self) {
        let mut count = self.lock();
        // never goes negative
        debug_assert!(*count > 0, "done() without matching add()");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn get(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // the guarded value is a plain integer, a panic elsewhere can't leave it torn
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn wait_returns_immediately_when_empty() {
        let pending = PendingCounter::new();
        pending.wait();
        assert_eq!(pending.get(), 0);
    }

    #[test]
    fn wait_blocks_until_all_done() {
        let pending = Arc::new(PendingCounter::new());
        for _ in 0..3 {
            pending.add();
        }

        let worker = {
            let pending = Arc::clone(&pending);
            thread::spawn(move || {
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(10));
                    pending.done();
                }
            })
        };

        pending.wait();
        assert_eq!(pending.get(), 0);
        worker.join().unwrap();
    }
}
