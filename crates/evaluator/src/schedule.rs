//! Re-check interval generators
//!
//! The evaluator asks its schedule for the delay until the next evaluation
//! after every cycle. Every interval is strictly positive.

use std::time::Duration;

use contracts::ProcessingConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::EvaluatorError;

/// Source of re-check intervals
pub trait IntervalSchedule: Send {
    /// Delay until the next evaluation (always > 0)
    fn next_interval(&mut self) -> Duration;
}

impl<T: IntervalSchedule + ?Sized> IntervalSchedule for Box<T> {
    fn next_interval(&mut self) -> Duration {
        (**self).next_interval()
    }
}

fn check_bounds(min: Duration, max: Duration) -> Result<(), EvaluatorError> {
    if min.is_zero() || min > max {
        return Err(EvaluatorError::InvalidInterval { min, max });
    }
    Ok(())
}

/// Uniformly random interval in `[min, max]`
#[derive(Debug, Clone)]
pub struct RandomInterval {
    min: Duration,
    max: Duration,
    rng: StdRng,
}

impl RandomInterval {
    /// Seeded from OS entropy
    pub fn new(min: Duration, max: Duration) -> Result<Self, EvaluatorError> {
        check_bounds(min, max)?;
        Ok(Self {
            min,
            max,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Reproducible sequence for a given seed
    pub fn with_seed(min: Duration, max: Duration, seed: u64) -> Result<Self, EvaluatorError> {
        check_bounds(min, max)?;
        Ok(Self {
            min,
            max,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Bounds and optional seed from the processing section
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, EvaluatorError> {
        let (min, max) = config.check_interval_bounds();
        match config.interval_seed {
            Some(seed) => Self::with_seed(min, max, seed),
            None => Self::new(min, max),
        }
    }
}

impl IntervalSchedule for RandomInterval {
    fn next_interval(&mut self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = self
            .rng
            .random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs).clamp(self.min, self.max)
    }
}

/// Constant interval, for deterministic runs
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval(Duration);

impl FixedInterval {
    pub fn new(interval: Duration) -> Result<Self, EvaluatorError> {
        check_bounds(interval, interval)?;
        Ok(Self(interval))
    }
}

impl IntervalSchedule for FixedInterval {
    fn next_interval(&mut self) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_interval_is_reproducible_and_bounded() {
        let min = Duration::from_secs(2);
        let max = Duration::from_secs(10);
        let mut a = RandomInterval::with_seed(min, max, 42).unwrap();
        let mut b = RandomInterval::with_seed(min, max, 42).unwrap();

        for _ in 0..100 {
            let next = a.next_interval();
            assert_eq!(next, b.next_interval());
            assert!(next >= min && next <= max);
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let err = RandomInterval::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, EvaluatorError::InvalidInterval { .. }));
        assert!(RandomInterval::new(Duration::from_secs(3), Duration::from_secs(1)).is_err());
        assert!(FixedInterval::new(Duration::ZERO).is_err());
    }

    #[test]
    fn test_equal_bounds_yield_constant() {
        let d = Duration::from_millis(250);
        let mut schedule = RandomInterval::with_seed(d, d, 1).unwrap();
        assert_eq!(schedule.next_interval(), d);
    }

    #[test]
    fn test_from_config_uses_seed() {
        let config = ProcessingConfig {
            interval_seed: Some(9),
            ..ProcessingConfig::default()
        };
        let mut a = RandomInterval::from_config(&config).unwrap();
        let mut b = RandomInterval::from_config(&config).unwrap();
        assert_eq!(a.next_interval(), b.next_interval());
    }
}
