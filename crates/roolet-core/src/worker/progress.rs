use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum interval between emitted `Progress` messages (`spec.md` §4.7).
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Handler-visible helper for reporting incremental progress on a
/// long-running method (`spec.md` §4.7).
///
/// `total`/`step` track a done/total counter; percent is derived and
/// throttled to at most one emission per `update_interval`, capped at 99
/// until [`ProgressProxy::done`] emits the terminal 100.
pub struct ProgressProxy {
    emit: Arc<dyn Fn(u8) + Send + Sync>,
    update_interval: Duration,
    total: Option<u64>,
    done: u64,
    last_sent: Option<Instant>,
    last_percent: Option<u8>,
}

impl ProgressProxy {
    pub fn new(emit: Arc<dyn Fn(u8) + Send + Sync>) -> Self {
        Self {
            emit,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            total: None,
            done: 0,
            last_sent: None,
            last_percent: None,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Resets the counter and sets the denominator for percent computation.
    pub fn total(&mut self, n: u64) {
        self.total = Some(n);
        self.done = 0;
        self.last_sent = None;
        self.last_percent = None;
    }

    /// Increments the counter by `delta` and, if due, emits a capped
    /// percent. With no `total` set, this still counts but never emits
    /// (there is no denominator to compute a percent from).
    pub fn step(&mut self, delta: u64) {
        self.done += delta;
        let Some(total) = self.total else { return };
        if total == 0 {
            return;
        }
        if !self.due() {
            return;
        }
        let ratio = self.done.min(total) as f64 / total as f64;
        let percent = (ratio * 100.0).floor().min(99.0) as u8;
        self.emit_if_changed(percent);
    }

    /// Emits the terminal 100% progress, bypassing the throttle.
    pub fn done(&mut self) {
        self.emit_if_changed(100);
    }

    fn due(&self) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => last.elapsed() >= self.update_interval,
        }
    }

    fn emit_if_changed(&mut self, percent: u8) {
        if self.last_percent == Some(percent) {
            return;
        }
        (self.emit)(percent);
        self.last_sent = Some(Instant::now());
        self.last_percent = Some(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_proxy() -> (ProgressProxy, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let proxy = ProgressProxy::new(Arc::new(move |percent| sink.lock().unwrap().push(percent)))
            .with_update_interval(Duration::from_millis(0));
        (proxy, seen)
    }

    #[test]
    fn step_without_total_is_noop_for_percent() {
        let (mut proxy, seen) = recording_proxy();
        proxy.step(1);
        proxy.step(1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn step_emits_capped_percent() {
        let (mut proxy, seen) = recording_proxy();
        proxy.total(10);
        for _ in 0..9 {
            proxy.step(1);
        }
        let last = *seen.lock().unwrap().last().unwrap();
        assert!(last <= 99);
    }

    #[test]
    fn full_progress_never_exceeds_99_before_done() {
        let (mut proxy, seen) = recording_proxy();
        proxy.total(1);
        proxy.step(1);
        assert_eq!(*seen.lock().unwrap().last().unwrap(), 99);
    }

    #[test]
    fn done_emits_100() {
        let (mut proxy, seen) = recording_proxy();
        proxy.total(1);
        proxy.step(1);
        proxy.done();
        assert_eq!(*seen.lock().unwrap().last().unwrap(), 100);
    }
}
