use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock the station schedules against
///
/// Times are durations since the Unix epoch. Stations never exchange clock
/// information, so every station's clock has to be disciplined externally
/// (NTP or similar) to well within one slot.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current wall-clock time
    fn now(&self) -> Duration;

    /// Completes once `deadline` has been reached
    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> + Send;
}

/// Operating system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }

    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(deadline.saturating_sub(self.now()))
    }
}

/// Virtual clock for tests; sleeping jumps straight to the deadline
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualClock {
    now: std::sync::Arc<std::sync::Mutex<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn starting_at(now: Duration) -> Self {
        ManualClock {
            now: std::sync::Arc::new(std::sync::Mutex::new(now)),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> + Send {
        let now = self.now.clone();
        async move {
            {
                let mut now = now.lock().unwrap();
                if *now < deadline {
                    *now = deadline;
                }
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_epoch() {
        let now = SystemClock.now();
        assert!(now > Duration::from_secs(1_000_000_000));
    }

    #[tokio::test]
    async fn test_system_clock_sleep_past_deadline() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep_until(before - Duration::from_secs(1)).await;
        assert!(clock.now() - before < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_manual_clock() {
        let clock = ManualClock::starting_at(Duration::from_secs(10));
        clock.sleep_until(Duration::from_millis(10_250)).await;
        assert_eq!(clock.now(), Duration::from_millis(10_250));

        // Never goes backwards
        clock.sleep_until(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), Duration::from_millis(10_250));

        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(10_255));
    }
}
