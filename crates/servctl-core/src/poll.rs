use std::time::{Duration, Instant};

/// Runs `predicate` until it returns true or `timeout` elapses, sleeping
/// `interval` between attempts.
///
/// The predicate always runs at least once, even with a zero timeout, and
/// a completed predicate returns immediately with no further sleep. The
/// deadline is checked before each sleep, so a completion that lands
/// mid-sleep is observed up to one `interval` late.
pub fn wait_until<P, S>(
    timeout: Duration,
    interval: Duration,
    mut predicate: P,
    mut sleep: S,
) -> bool
where
    P: FnMut() -> bool,
    S: FnMut(Duration),
{
    let started = Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::wait_until;
    use std::time::Duration;

    #[test]
    fn predicate_runs_at_least_once_with_zero_timeout() {
        let mut calls = 0usize;
        let done = wait_until(
            Duration::ZERO,
            Duration::from_secs(3600),
            || {
                calls += 1;
                false
            },
            |_| panic!("must not sleep when the deadline is already past"),
        );
        assert!(!done);
        assert_eq!(calls, 1);
    }

    #[test]
    fn completion_short_circuits_before_any_sleep() {
        let mut sleeps = 0usize;
        let done = wait_until(
            Duration::from_secs(3600),
            Duration::from_secs(1),
            || true,
            |_| sleeps += 1,
        );
        assert!(done);
        assert_eq!(sleeps, 0);
    }

    #[test]
    fn completion_on_a_later_attempt_stops_the_loop() {
        let mut calls = 0usize;
        let mut sleeps = 0usize;
        let done = wait_until(
            Duration::from_secs(3600),
            Duration::from_millis(1),
            || {
                calls += 1;
                calls == 3
            },
            |interval| {
                sleeps += 1;
                std::thread::sleep(interval);
            },
        );
        assert!(done);
        assert_eq!(calls, 3);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn deadline_exhaustion_reports_failure() {
        let mut calls = 0usize;
        let done = wait_until(
            Duration::from_millis(10),
            Duration::from_millis(2),
            || {
                calls += 1;
                false
            },
            std::thread::sleep,
        );
        assert!(!done);
        assert!(calls >= 2);
    }
}
