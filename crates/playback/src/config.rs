use std::env;
use std::time::Duration;

/// Reveal pacing for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub delay: Duration,
    /// A snapshot is published on every unit index divisible by this, and on
    /// the last unit.
    pub publish_every: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub json: Cadence,
    pub explanation: Cadence,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            json: Cadence {
                delay: Duration::from_millis(20),
                publish_every: 5,
            },
            explanation: Cadence {
                delay: Duration::from_millis(15),
                publish_every: 10,
            },
        }
    }
}

impl PlaybackConfig {
    /// Defaults, with delays overridden by `PULSE_JSON_DELAY_MS` and
    /// `PULSE_EXPLANATION_DELAY_MS` when they parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.json.delay = delay_from_env("PULSE_JSON_DELAY_MS", config.json.delay);
        config.explanation.delay =
            delay_from_env("PULSE_EXPLANATION_DELAY_MS", config.explanation.delay);
        config
    }

    /// Same publishing cadence, no pacing delay.
    pub fn instant() -> Self {
        let mut config = Self::default();
        config.json.delay = Duration::ZERO;
        config.explanation.delay = Duration::ZERO;
        config
    }
}

fn delay_from_env(key: &str, fallback: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reveal_pacing() {
        let config = PlaybackConfig::default();
        assert_eq!(config.json.delay, Duration::from_millis(20));
        assert_eq!(config.json.publish_every, 5);
        assert_eq!(config.explanation.delay, Duration::from_millis(15));
        assert_eq!(config.explanation.publish_every, 10);
    }

    #[test]
    fn unparseable_env_falls_back() {
        assert_eq!(
            delay_from_env("PULSE_TEST_UNSET_DELAY", Duration::from_millis(7)),
            Duration::from_millis(7)
        );
    }
}
