//! Incremental scrolling to load lazily rendered results

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use super::stabilizer::{Stabilization, Stabilizer};
use crate::config::{ScrapeConfig, Settings};
use crate::delay::{DelayPolicy, Phase};
use crate::error::ScrapeError;
use crate::traits::BrowserPage;

/// Why scrolling stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollStop {
    /// No new items for `stall_limit` consecutive steps
    Stalled,
    /// `max_scrolls` steps taken
    BudgetExhausted,
    /// The configured result cap is already satisfied
    CapReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollReport {
    /// Highest item count observed
    pub items: usize,
    pub steps: u32,
    pub stop: ScrollStop,
    /// Stabilization result of the final step
    pub last: Stabilization,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSettings {
    pub max_scrolls: u32,
    pub stall_limit: u32,
    /// Stabilization timeout applied after each step
    pub step_timeout: Duration,
    /// Share of the viewport height advanced per step
    pub viewport_fraction: f64,
    /// Random +/- pixels added to every step
    pub jitter_px: u32,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            max_scrolls: 10,
            stall_limit: 3,
            step_timeout: Duration::from_secs(5),
            viewport_fraction: 0.8,
            jitter_px: 50,
        }
    }
}

impl From<&Settings> for ScrollSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            max_scrolls: settings.max_scrolls,
            stall_limit: settings.stall_limit,
            ..Self::default()
        }
    }
}

/// Scrolls the results page step by step until the feed stops growing
#[derive(Debug, Clone)]
pub struct Scroller {
    settings: ScrollSettings,
    delays: DelayPolicy,
}

impl Scroller {
    pub fn new(settings: ScrollSettings, delays: DelayPolicy) -> Self {
        Self { settings, delays }
    }

    pub fn settings(&self) -> &ScrollSettings {
        &self.settings
    }

    /// Scrolls and re-stabilizes until the stall limit, the scroll budget or
    /// the result cap stops it. `initial` is the stabilization that preceded
    /// scrolling.
    pub async fn scroll_and_collect(
        &self,
        page: &dyn BrowserPage,
        stabilizer: &Stabilizer,
        config: &ScrapeConfig,
        initial: Stabilization,
    ) -> Result<ScrollReport, ScrapeError> {
        let start = ScrollReport {
            items: initial.count,
            steps: 0,
            stop: ScrollStop::Stalled,
            last: initial,
        };
        self.run(page, stabilizer, config.fast, config.max_results, start)
            .await
    }

    /// Continues an earlier run until at least `target` items are on the
    /// page. Steps already taken count against the scroll budget.
    pub async fn resume(
        &self,
        page: &dyn BrowserPage,
        stabilizer: &Stabilizer,
        fast: bool,
        target: usize,
        previous: &ScrollReport,
    ) -> Result<ScrollReport, ScrapeError> {
        self.run(page, stabilizer, fast, Some(target), *previous).await
    }

    async fn run(
        &self,
        page: &dyn BrowserPage,
        stabilizer: &Stabilizer,
        fast: bool,
        target: Option<usize>,
        start: ScrollReport,
    ) -> Result<ScrollReport, ScrapeError> {
        let mut last = start.last;
        let mut observed = start.items;
        let mut steps = start.steps;
        let mut stall = 0;

        let stop = loop {
            if target.is_some_and(|target| observed >= target) {
                break ScrollStop::CapReached;
            }
            if steps >= self.settings.max_scrolls {
                break ScrollStop::BudgetExhausted;
            }

            let viewport = page.viewport_height().await?;
            let position = page.scroll_by(self.increment(viewport)).await?;
            steps += 1;

            self.delays.pause(Phase::ScrollPause, fast).await;
            last = stabilizer
                .wait_until_stable_after(page, &last, self.settings.step_timeout, fast)
                .await?;

            if last.count > observed {
                observed = last.count;
                stall = 0;
            } else {
                stall += 1;
            }
            debug!(
                "Scroll step {}: offset {:.0}/{:.0}, {} items, stall {}",
                steps, position.offset, position.height, observed, stall
            );

            if stall >= self.settings.stall_limit {
                break ScrollStop::Stalled;
            }
        };

        info!(
            "Scrolling finished after {} steps with {} items ({:?})",
            steps, observed, stop
        );
        Ok(ScrollReport {
            items: observed,
            steps,
            stop,
            last,
        })
    }

    fn increment(&self, viewport: u32) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let base = (f64::from(viewport) * self.settings.viewport_fraction) as i64;
        let jitter = i64::from(self.settings.jitter_px);
        let jittered = if jitter > 0 {
            base + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            base
        };
        u32::try_from(jittered.max(1)).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_stays_near_viewport_fraction() {
        let scroller = Scroller::new(ScrollSettings::default(), DelayPolicy::default());
        for _ in 0..100 {
            let step = scroller.increment(1000);
            assert!((750..=850).contains(&step), "step {step} out of range");
        }
    }

    #[test]
    fn increment_never_zero() {
        let settings = ScrollSettings {
            viewport_fraction: 0.0,
            jitter_px: 0,
            ..ScrollSettings::default()
        };
        let scroller = Scroller::new(settings, DelayPolicy::default());
        assert_eq!(scroller.increment(0), 1);
    }
}
