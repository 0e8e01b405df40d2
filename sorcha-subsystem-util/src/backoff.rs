// This file is part of Sorcha.
//
// Sorcha is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Sorcha is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Sorcha.  If not, see <http://www.gnu.org/licenses/>.

//! Exponential backoff with jitter, shared by the connection pool's
//! circuit breaker (§4.3), the subscription manager's preferred-peer
//! retry (§4.5, §9.1), and the replication engine's offline durable
//! queue (§4.6).

use rand::Rng;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the computed delay randomized away, in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Tracks attempt count for one failing peer/subscription/queue entry and
/// produces the next delay. Stateless beyond `attempt`; callers own the
/// instance per failing entity rather than sharing one globally.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Resets the attempt counter after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records a failure and returns the delay to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let base_millis = self.config.initial.as_millis() as f64
            * self.config.multiplier.powi(self.attempt as i32);
        let capped = base_millis.min(self.config.max.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_span = capped * self.config.jitter;
        let jittered = if jitter_span > 0.0 {
            let mut rng = rand::thread_rng();
            capped - jitter_span / 2.0 + rng.gen_range(0.0..jitter_span)
        } else {
            capped
        };
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Sleeps for `next_delay()`. Uses `futures-timer` rather than a
    /// runtime-specific sleep so this helper stays usable from any
    /// executor a subsystem happens to run under.
    pub async fn wait(&mut self) {
        futures_timer::Delay::new(self.next_delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_until_capped() {
        let config = BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let mut backoff = Backoff::new(config);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn reset_returns_to_initial_delay() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        });
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }
}
