//! Session-wide stop signal and clock

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Cooperative cancellation shared by every loop of a tracking session
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Raise the signal; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns on a raise
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration`, waking early on stop; true if stopped
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = self.stopped() => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Start time and configured length of a tracking session
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
    duration: Duration,
}

impl SessionClock {
    pub fn start(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    /// Elapsed fraction of the session (0-1)
    pub fn fraction(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed().as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signal_wakes_sleepers() {
        let stop = StopSignal::new();
        let sleeper = stop.clone();

        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.trigger();

        let stopped = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sleeper did not wake")
            .unwrap();
        assert!(stopped);
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_runs_to_completion_without_stop() {
        let stop = StopSignal::new();
        assert!(!stop.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_stopped_after_trigger_returns_immediately() {
        let stop = StopSignal::new();
        stop.trigger();
        stop.trigger();
        tokio::time::timeout(Duration::from_millis(100), stop.stopped())
            .await
            .unwrap();
    }

    #[test]
    fn test_session_clock() {
        let clock = SessionClock::start(Duration::from_secs(3600));
        assert!(!clock.expired());
        assert!(clock.fraction() < 0.01);

        let zero = SessionClock::start(Duration::ZERO);
        assert!(zero.expired());
        assert_eq!(zero.fraction(), 1.0);
    }
}
