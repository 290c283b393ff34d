//! Cross-thread control of a running element.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Stop flag and pause gate shared between a pipeline and one worker.
///
/// Stop is cooperative: the worker polls [`is_stopping`](Self::is_stopping)
/// between chunks and inside every bounded wait.
#[derive(Debug, Default)]
pub struct ElementControl {
    stop: AtomicBool,
    paused: Mutex<bool>,
    wake: Condvar,
}

impl ElementControl {
    /// Create a control in the running, not-stopping state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to exit. Wakes a paused worker.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    /// Check if a stop was requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Park or release the worker.
    pub fn set_paused(&self, paused: bool) {
        let mut guard = self.paused.lock().unwrap_or_else(|e| e.into_inner());
        *guard = paused;
        if !paused {
            self.wake.notify_all();
        }
    }

    /// Check if the worker should be parked.
    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block while paused, waking at least every `poll` to recheck stop.
    pub fn wait_while_paused(&self, poll: Duration) {
        let mut guard = self.paused.lock().unwrap_or_else(|e| e.into_inner());
        while *guard && !self.is_stopping() {
            guard = match self.wake.wait_timeout(guard, poll) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Clear stop and pause before a new run.
    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::Release);
        self.set_paused(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_stop_flag() {
        let control = ElementControl::new();
        assert!(!control.is_stopping());
        control.request_stop();
        assert!(control.is_stopping());
        control.reset();
        assert!(!control.is_stopping());
    }

    #[test]
    fn test_resume_releases_paused_worker() {
        let control = Arc::new(ElementControl::new());
        control.set_paused(true);

        let worker = {
            let control = control.clone();
            thread::spawn(move || control.wait_while_paused(Duration::from_millis(5)))
        };

        thread::sleep(Duration::from_millis(20));
        control.set_paused(false);
        worker.join().unwrap();
        assert!(!control.is_paused());
    }

    #[test]
    fn test_stop_releases_paused_worker() {
        let control = Arc::new(ElementControl::new());
        control.set_paused(true);

        let start = Instant::now();
        let worker = {
            let control = control.clone();
            thread::spawn(move || control.wait_while_paused(Duration::from_millis(5)))
        };

        control.request_stop();
        worker.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
