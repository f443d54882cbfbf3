use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::RetryConfig;

/// Jittered exponential backoff schedule.
///
/// Each interval is the current base randomized by `randomization_factor`
/// (uniform in `[base * (1 - f), base * (1 + f)]`); the base then grows by
/// `multiplier` up to `max_interval`. The schedule ends once
/// `max_elapsed_time` has passed since the first interval was requested;
/// a zero `max_elapsed_time` never ends it.
#[derive(Debug)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        let current_interval = config.initial_interval;
        Self {
            config,
            current_interval,
            started_at: Instant::now(),
        }
    }

    /// Next sleep interval, or `None` when the schedule is exhausted.
    pub fn next_interval(&mut self) -> Option<Duration> {
        let max_elapsed = self.config.max_elapsed_time;
        if !max_elapsed.is_zero() && self.started_at.elapsed() >= max_elapsed {
            return None;
        }

        let interval = self.jittered(self.current_interval);

        let next = self.current_interval.mul_f64(self.config.multiplier.max(1.0));
        self.current_interval = next.min(self.config.max_interval);

        Some(interval)
    }

    fn jittered(&self, interval: Duration) -> Duration {
        let factor = self.config.randomization_factor.clamp(0.0, 1.0);
        if factor == 0.0 {
            return interval;
        }
        let delta = interval.as_secs_f64() * factor;
        let low = interval.as_secs_f64() - delta;
        let high = interval.as_secs_f64() + delta;
        Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
    }
}

/// Run `operation` until it succeeds or the backoff schedule is exhausted,
/// sleeping between attempts. The last error is returned on exhaustion.
///
/// The policy does not classify errors; callers that need to give up early
/// bound the whole call with a deadline instead, which cancels the retry at
/// the next sleep or await point.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = ExponentialBackoff::new(config.clone());
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => match backoff.next_interval() {
                Some(interval) => tokio::time::sleep(interval).await,
                None => return Err(err),
            },
        }
    }
}
