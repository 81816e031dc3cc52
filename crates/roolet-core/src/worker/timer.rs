use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative, advisory deadline a handler can poll against (`spec.md`
/// §4.7, §5). Non-cooperative handlers are never forcibly killed; a
/// `Timer` only raises if the handler chooses to check it.
#[derive(Clone)]
pub struct Timer {
    deadline: Instant,
    stopped: Arc<AtomicBool>,
}

/// Raised by [`Timer::raise_if_exceeded`] once the deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExceeded;

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Disarms the timer; subsequent calls to `raise_if_exceeded` are no-ops.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn raise_if_exceeded(&self) -> Result<(), TimerExceeded> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        if Instant::now() >= self.deadline {
            return Err(TimerExceeded);
        }
        Ok(())
    }
}
