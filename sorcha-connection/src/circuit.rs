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

//! Circuit breaker for reconnect attempts (§4.3): opens after
//! `threshold` consecutive failures and stays open for `reset_minutes`
//! before allowing another attempt. Driven by the overseer's `Tick`
//! signal (§2.1) rather than its own timer, so it stays deterministic
//! and unit-testable.

#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub reset_micros: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_micros: 5 * 60 * 1_000_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CircuitBreaker {
    config_threshold: u32,
    config_reset_micros: i64,
    consecutive_failures: u32,
    opened_at: Option<i64>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config_threshold: config.threshold,
            config_reset_micros: config.reset_micros,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// `true` if an attempt should be allowed right now, either because
    /// the circuit is closed or because the reset window has elapsed.
    pub fn allow_attempt(&mut self, now: i64) -> bool {
        match self.opened_at {
            None => true,
            Some(opened) if now - opened >= self.config_reset_micros => {
                self.opened_at = None;
                true
            }
            Some(_) => false,
        }
    }

    /// Records a failed attempt; opens the circuit once `threshold`
    /// consecutive failures are reached.
    pub fn record_failure(&mut self, now: i64) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config_threshold && self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            threshold: 3,
            reset_micros: 1000,
        });
        assert!(cb.allow_attempt(0));
        cb.record_failure(0);
        cb.record_failure(0);
        assert!(!cb.is_open());
        cb.record_failure(0);
        assert!(cb.is_open());
        assert!(!cb.allow_attempt(0));
    }

    #[test]
    fn reopens_for_attempts_after_reset_window() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            threshold: 1,
            reset_micros: 1000,
        });
        cb.record_failure(0);
        assert!(!cb.allow_attempt(500));
        assert!(cb.allow_attempt(1000));
    }

    #[test]
    fn success_resets_failure_count_and_closes_circuit() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            threshold: 2,
            reset_micros: 1000,
        });
        cb.record_failure(0);
        cb.record_success();
        cb.record_failure(0);
        assert!(!cb.is_open());
    }
}
