//! Bounded waiting for eventually consistent external state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ReconcilerConfig;

/// How long to keep probing, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryWindow {
    pub timeout: Duration,
    pub interval: Duration,
}

impl RetryWindow {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Window for a freshly submitted job to become visible.
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self::new(config.poll_timeout(), config.poll_interval())
    }
}

impl Default for RetryWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_millis(100))
    }
}

/// Run `probe` until it yields a value or the window closes.
///
/// The probe always runs at least once, and once more at the deadline.
/// Returns `None` when the window elapsed without a value.
pub async fn poll_until<T, F, Fut>(window: RetryWindow, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + window.timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        let remaining = deadline - now;
        tokio::time::sleep(window.interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_value() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let start = Instant::now();

        let value = poll_until(RetryWindow::default(), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                (n == 3).then_some(n)
            }
        })
        .await;

        assert_eq!(value, Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_deadline() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let window = RetryWindow::new(Duration::from_secs(5), Duration::from_millis(100));
        let start = Instant::now();

        let value: Option<()> = poll_until(window, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;

        assert!(value.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= window.timeout);
        assert!(elapsed < window.timeout + window.interval);
        assert_eq!(attempts.load(Ordering::SeqCst), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_probes_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let window = RetryWindow::new(Duration::ZERO, Duration::from_millis(100));

        let value: Option<()> = poll_until(window, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;

        assert!(value.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_is_clamped_to_deadline() {
        let window = RetryWindow::new(Duration::from_millis(250), Duration::from_millis(100));
        let start = Instant::now();
        let value: Option<()> = poll_until(window, || async { None }).await;
        assert!(value.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_config() {
        let window = RetryWindow::from_config(&ReconcilerConfig::default());
        assert_eq!(window, RetryWindow::default());
    }
}
