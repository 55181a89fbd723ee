//! Explicit periodic tasks.
//!
//! Auto-refresh style behavior runs as a dedicated thread driven by a tick
//! channel and stopped through a cancellation token, so nothing keeps firing
//! after its owner is gone.

use crate::Token;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A periodic task bound to a cancellation token.
pub struct PeriodicTask {
    cancel: Arc<Token>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a task invoking `tick` at the given interval.
    ///
    /// The task stops when it is cancelled, dropped, or when `tick` returns
    /// `false`.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> PeriodicTask
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancel = Arc::new(Token::new());
        let inner = Arc::clone(&cancel);

        let handle = thread::spawn(move || {
            let ticker = crossbeam_channel::tick(interval);

            loop {
                if ticker.recv().is_err() {
                    break;
                }

                if inner.is_set() {
                    break;
                }

                if !tick() {
                    break;
                }
            }
        });

        PeriodicTask {
            cancel,
            handle: Some(handle),
        }
    }

    /// The token stopping the task.
    pub fn cancel_token(&self) -> &Arc<Token> {
        &self.cancel
    }

    /// Request the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.set();
    }

    /// Stop the task and wait for its thread to exit.
    pub fn stop(mut self) {
        self.cancel.set();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.set();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PeriodicTask;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);

        let task = PeriodicTask::spawn(Duration::from_millis(5), move || {
            inner.fetch_add(1, Ordering::SeqCst);
            true
        });

        while count.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }

        task.stop();
        let after = count.load(Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_callback_can_stop_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);

        let task = PeriodicTask::spawn(Duration::from_millis(5), move || {
            inner.fetch_add(1, Ordering::SeqCst) < 1
        });

        while count.load(Ordering::SeqCst) < 2 {
            std::thread::sleep(Duration::from_millis(1));
        }

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop(task);
    }
}
