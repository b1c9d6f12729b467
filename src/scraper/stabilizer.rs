//! Waiting for a dynamically rendered result region to settle

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::delay::{DelayPolicy, Phase};
use crate::error::ScrapeError;
use crate::traits::{BrowserPage, SiteProfile};

/// Consecutive unchanged ticks required before the region counts as stable
pub const CONFIRM_TICKS: u32 = 2;

/// Outcome of one stabilization wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilization {
    /// `false` when the timeout elapsed first; the caller may still use
    /// whatever is on the page
    pub stable: bool,
    /// Item count observed at the last tick
    pub count: usize,
    /// Whether the broad container selector was used instead of the primary one
    pub used_fallback: bool,
}

/// Polls the item count until it stops changing
#[derive(Debug, Clone)]
pub struct Stabilizer {
    primary: String,
    fallback: String,
    delays: DelayPolicy,
}

impl Stabilizer {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>, delays: DelayPolicy) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
            delays,
        }
    }

    pub fn for_site(site: &SiteProfile, delays: DelayPolicy) -> Self {
        Self::new(
            site.selectors.item_anchor.clone(),
            site.selectors.item_container.clone(),
            delays,
        )
    }

    /// Polls until the item count is non-zero and unchanged for
    /// [`CONFIRM_TICKS`] ticks, or `timeout` elapses.
    ///
    /// Starts on the primary selector and switches to the container selector
    /// if the primary still matches nothing after the grace period.
    pub async fn wait_until_stable(
        &self,
        page: &dyn BrowserPage,
        timeout: Duration,
        fast: bool,
    ) -> Result<Stabilization, ScrapeError> {
        self.poll(page, false, timeout, fast).await
    }

    /// Like [`wait_until_stable`](Self::wait_until_stable) but stays on the
    /// selector an earlier wait settled on, skipping the grace period.
    pub async fn wait_until_stable_after(
        &self,
        page: &dyn BrowserPage,
        previous: &Stabilization,
        timeout: Duration,
        fast: bool,
    ) -> Result<Stabilization, ScrapeError> {
        self.poll(page, previous.used_fallback, timeout, fast).await
    }

    async fn poll(
        &self,
        page: &dyn BrowserPage,
        mut used_fallback: bool,
        timeout: Duration,
        fast: bool,
    ) -> Result<Stabilization, ScrapeError> {
        let interval = self.delays.sample(Phase::StabilizerPoll, fast);
        let grace = self.delays.sample(Phase::SelectorGrace, fast);
        let started = Instant::now();

        let mut previous: Option<usize> = None;
        let mut unchanged = 0;

        loop {
            let selector = if used_fallback {
                &self.fallback
            } else {
                &self.primary
            };
            let count = page.count(selector).await?;

            if count == 0 && !used_fallback && started.elapsed() >= grace {
                debug!(
                    "Primary selector matched nothing after {:.1}s, falling back to containers",
                    grace.as_secs_f64()
                );
                used_fallback = true;
                previous = None;
                unchanged = 0;
                continue;
            }

            if count > 0 && previous == Some(count) {
                unchanged += 1;
                if unchanged >= CONFIRM_TICKS {
                    debug!(
                        "Result region stable at {} items after {:.2}s",
                        count,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(Stabilization {
                        stable: true,
                        count,
                        used_fallback,
                    });
                }
            } else {
                unchanged = 0;
            }
            previous = Some(count);

            if started.elapsed() >= timeout {
                debug!(
                    "Result region not stable after {:.1}s ({} items)",
                    timeout.as_secs_f64(),
                    count
                );
                return Ok(Stabilization {
                    stable: false,
                    count,
                    used_fallback,
                });
            }

            tokio::time::sleep(interval).await;
        }
    }
}
