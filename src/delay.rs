//! Timing policy for every wait in the scraping flow

use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Points in the scrape where the flow pauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before a browser is acquired for a new scrape
    BeforeLaunch,
    /// Reading time after the results page has loaded
    AfterNavigation,
    /// Looking at the consent interstitial before clicking
    ConsentRead,
    /// Between locating the accept button and clicking it
    ConsentClick,
    /// Waiting for the redirect back to the results page
    AfterConsent,
    /// Between two scroll steps
    ScrollPause,
    /// Backoff before the single navigation retry
    NavigationRetry,
    /// Interval between two stabilizer ticks
    StabilizerPoll,
    /// How long the primary selector may stay empty before falling back
    SelectorGrace,
    /// Just before the page snapshot is taken for extraction
    BeforeExtraction,
}

impl Phase {
    /// Normal-mode bounds in milliseconds.
    const fn bounds_ms(self) -> (u64, u64) {
        match self {
            Self::BeforeLaunch => (1_000, 3_000),
            Self::AfterNavigation => (3_000, 7_000),
            Self::ConsentRead => (2_000, 4_000),
            Self::ConsentClick => (300, 800),
            Self::AfterConsent => (2_000, 4_000),
            Self::ScrollPause => (800, 1_500),
            Self::NavigationRetry => (1_500, 3_000),
            Self::StabilizerPoll => (500, 500),
            Self::SelectorGrace => (2_000, 2_000),
            Self::BeforeExtraction => (500, 1_000),
        }
    }
}

/// Maps a [`Phase`] to a duration range, with a fast variant obtained by
/// scaling both bounds by `fast_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayPolicy {
    fast_factor: f64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self { fast_factor: 0.3 }
    }
}

impl DelayPolicy {
    pub fn new(fast_factor: f64) -> Self {
        Self { fast_factor }
    }

    pub fn fast_factor(&self) -> f64 {
        self.fast_factor
    }

    /// Inclusive bounds for `phase`.
    pub fn range(&self, phase: Phase, fast: bool) -> (Duration, Duration) {
        let (min, max) = phase.bounds_ms();
        let factor = if fast { self.fast_factor } else { 1.0 };
        (scale_ms(min, factor), scale_ms(max, factor))
    }

    /// A uniformly random duration within the phase bounds.
    pub fn sample(&self, phase: Phase, fast: bool) -> Duration {
        let (min, max) = self.range(phase, fast);
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    pub async fn pause(&self, phase: Phase, fast: bool) {
        let delay = self.sample(phase, fast);
        debug!("Pausing {:?} for {:.2}s", phase, delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

fn scale_ms(ms: u64, factor: f64) -> Duration {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let micros = (ms as f64 * 1_000.0 * factor).round() as u64;
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 10] = [
        Phase::BeforeLaunch,
        Phase::AfterNavigation,
        Phase::ConsentRead,
        Phase::ConsentClick,
        Phase::AfterConsent,
        Phase::ScrollPause,
        Phase::NavigationRetry,
        Phase::StabilizerPoll,
        Phase::SelectorGrace,
        Phase::BeforeExtraction,
    ];

    #[test]
    fn fast_mode_is_always_shorter() {
        let policy = DelayPolicy::default();
        for phase in ALL {
            let (_, fast_max) = policy.range(phase, true);
            let (normal_min, _) = policy.range(phase, false);
            assert!(fast_max < normal_min, "{phase:?} overlaps in fast mode");
        }
    }

    #[test]
    fn samples_stay_within_bounds() {
        let policy = DelayPolicy::new(0.5);
        for phase in ALL {
            for fast in [false, true] {
                let (min, max) = policy.range(phase, fast);
                let sample = policy.sample(phase, fast);
                assert!(sample >= min && sample <= max);
            }
        }
    }

    #[test]
    fn fixed_phases_are_deterministic() {
        let policy = DelayPolicy::default();
        assert_eq!(
            policy.sample(Phase::StabilizerPoll, false),
            Duration::from_millis(500)
        );
        assert_eq!(
            policy.sample(Phase::StabilizerPoll, true),
            Duration::from_millis(150)
        );
    }
}
