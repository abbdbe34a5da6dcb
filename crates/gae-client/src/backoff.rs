//! Delay policy between status checks of a running job.

use std::time::Duration;

use gae_types::EngineConfig;

/// Backoff policy controlling the delay between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollBackoff {
    /// Fixed delay between polls.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
}

impl PollBackoff {
    /// Compute the delay after a given poll attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            PollBackoff::Fixed(d) => *d,
            PollBackoff::Exponential { base, max } => {
                let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
                let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(exp));
                Duration::from_millis(millis).min(*max)
            }
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        match config.poll_interval_max {
            Some(max) if max > config.poll_interval => PollBackoff::Exponential {
                base: config.poll_interval,
                max,
            },
            _ => PollBackoff::Fixed(config.poll_interval),
        }
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        PollBackoff::Fixed(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let policy = PollBackoff::Fixed(Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(250));
    }

    #[test]
    fn exponential_grows_and_caps() {
        let policy = PollBackoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_millis(1000));
    }

    #[test]
    fn default_is_half_second() {
        assert_eq!(
            PollBackoff::default(),
            PollBackoff::Fixed(Duration::from_millis(500))
        );
    }

    #[test]
    fn from_config_picks_policy() {
        let config = EngineConfig::new("http://e", "http://a", "u", "p")
            .with_poll_interval(Duration::from_millis(200));
        assert_eq!(
            PollBackoff::from_config(&config),
            PollBackoff::Fixed(Duration::from_millis(200))
        );

        let config = config.with_poll_interval_max(Duration::from_secs(5));
        assert_eq!(
            PollBackoff::from_config(&config),
            PollBackoff::Exponential {
                base: Duration::from_millis(200),
                max: Duration::from_secs(5),
            }
        );
    }
}
