pub mod extractor;
pub mod scroller;
pub mod stabilizer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::SessionManager;
use crate::config::{ScrapeConfig, Settings};
use crate::delay::{DelayPolicy, Phase};
use crate::error::{ScrapeError, ScrapeWarning};
use crate::models::{ProductRecord, ScrapeResult};
use crate::output::query_slug;
use crate::traits::{BrowserPage, SiteProfile};

use extractor::{Extractor, looks_blocked};
use scroller::{ScrollSettings, ScrollStop, Scroller};
use stabilizer::Stabilizer;

/// Stages of one scrape. `Failed` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Init,
    Navigating,
    ConsentHandling,
    Stabilizing,
    Scrolling,
    Extracting,
    Done,
    Failed,
}

struct Run {
    state: ScrapeState,
    warnings: Vec<ScrapeWarning>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: ScrapeState::Init,
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, next: ScrapeState) {
        debug!("Scrape state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Runs scrapes against one site, borrowing browsers from a shared
/// [`SessionManager`]
pub struct ShoppingScraper {
    sessions: Arc<SessionManager>,
    site: SiteProfile,
    delays: DelayPolicy,
    stabilizer: Stabilizer,
    scroller: Scroller,
    extractor: Extractor,
    stabilize_timeout: Duration,
    debug_dir: PathBuf,
}

impl ShoppingScraper {
    pub fn new(
        sessions: Arc<SessionManager>,
        site: SiteProfile,
        settings: &Settings,
    ) -> Result<Self, ScrapeError> {
        let delays = DelayPolicy::new(settings.fast_factor);
        Self::with_parts(
            sessions,
            site,
            delays,
            ScrollSettings::from(settings),
            settings.stabilize_timeout,
            settings.debug_dir.clone(),
        )
    }

    pub fn with_parts(
        sessions: Arc<SessionManager>,
        site: SiteProfile,
        delays: DelayPolicy,
        scroll: ScrollSettings,
        stabilize_timeout: Duration,
        debug_dir: PathBuf,
    ) -> Result<Self, ScrapeError> {
        let extractor = Extractor::new(&site)?;
        let stabilizer = Stabilizer::for_site(&site, delays);
        let scroller = Scroller::new(scroll, delays);

        Ok(Self {
            sessions,
            site,
            delays,
            stabilizer,
            scroller,
            extractor,
            stabilize_timeout,
            debug_dir,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    /// Scrapes the results page for `config.query`.
    ///
    /// The session is released according to `keep_session` on success and
    /// always torn down on failure.
    pub async fn scrape(&self, config: &ScrapeConfig) -> Result<ScrapeResult, ScrapeError> {
        let started = Instant::now();
        let mut run = Run::new();

        if let Err(e) = config.validate() {
            run.enter(ScrapeState::Failed);
            warn!("Rejected scrape request: {}", e);
            return Err(e);
        }

        info!(
            "Scraping {} for '{}' (headless: {}, fast: {}, keep session: {})",
            self.site.name, config.query, config.headless, config.fast, config.keep_session
        );

        self.delays.pause(Phase::BeforeLaunch, config.fast).await;
        let lease = match self.sessions.acquire(config).await {
            Ok(lease) => lease,
            Err(e) => {
                error!("Could not acquire a browser for '{}': {}", config.query, e);
                run.enter(ScrapeState::Failed);
                return Err(e);
            }
        };

        let outcome = self.drive(lease.session().page(), config, &mut run).await;

        match outcome {
            Ok(mut records) => {
                self.sessions.release(lease, config.keep_session).await;
                if let Some(max) = config.max_results {
                    records.truncate(max);
                }
                run.enter(ScrapeState::Done);

                let elapsed = started.elapsed().as_secs_f64();
                info!(
                    "Scraped {} products for '{}' in {:.2}s ({} warnings)",
                    records.len(),
                    config.query,
                    elapsed,
                    run.warnings.len()
                );
                Ok(ScrapeResult::new(config, records, run.warnings, elapsed))
            }
            Err(e) => {
                error!(
                    "Scrape for '{}' failed while {:?}: {}",
                    config.query, run.state, e
                );
                run.enter(ScrapeState::Failed);
                self.sessions.release(lease, false).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        page: &dyn BrowserPage,
        config: &ScrapeConfig,
        run: &mut Run,
    ) -> Result<Vec<ProductRecord>, ScrapeError> {
        let fast = config.fast;

        run.enter(ScrapeState::Navigating);
        let url = self.site.build_search_url(&config.query);
        self.navigate(page, &url, fast).await?;

        run.enter(ScrapeState::ConsentHandling);
        self.handle_consent(page, fast, &mut run.warnings).await;
        self.delays.pause(Phase::AfterNavigation, fast).await;

        run.enter(ScrapeState::Stabilizing);
        let initial = self
            .stabilizer
            .wait_until_stable(page, self.stabilize_timeout, fast)
            .await?;
        if !initial.stable {
            warn!(
                "Results did not settle within {:.1}s, continuing with {} items",
                self.stabilize_timeout.as_secs_f64(),
                initial.count
            );
            run.warnings.push(ScrapeWarning::PageNotStable {
                phase: "initial".to_string(),
                item_count: initial.count,
            });
        }

        run.enter(ScrapeState::Scrolling);
        let mut report = self
            .scroller
            .scroll_and_collect(page, &self.stabilizer, config, initial)
            .await?;

        run.enter(ScrapeState::Extracting);
        let (html, extraction) = loop {
            self.delays.pause(Phase::BeforeExtraction, fast).await;
            let html = page.content().await?;
            let extraction = self.extractor.extract(&html);

            // Untitled and duplicate items count towards the page total but
            // not towards the cap, so scroll on for the shortfall.
            let short = report.stop == ScrollStop::CapReached
                && !config.cap_reached(extraction.records.len());
            if !short {
                break (html, extraction);
            }
            let missing = config
                .max_results
                .map_or(0, |max| max.saturating_sub(extraction.records.len()));
            let target = report.items + missing;
            debug!(
                "Only {} usable records of {} items, scrolling on to {}",
                extraction.records.len(),
                report.items,
                target
            );
            run.enter(ScrapeState::Scrolling);
            report = self
                .scroller
                .resume(page, &self.stabilizer, fast, target, &report)
                .await?;
            run.enter(ScrapeState::Extracting);
        };

        if report.steps > 0 && !report.last.stable && report.stop != ScrollStop::CapReached {
            run.warnings.push(ScrapeWarning::PageNotStable {
                phase: "scrolling".to_string(),
                item_count: report.items,
            });
        }
        if looks_blocked(&html) {
            warn!("CAPTCHA detected! The site is blocking automated requests");
            run.warnings.push(ScrapeWarning::CaptchaSuspected);
        }
        if config.debug {
            if let Err(e) = self.capture_debug(&config.query, &html).await {
                error!("Failed to save page snapshot: {}", e);
                run.warnings.push(ScrapeWarning::DebugCaptureFailed {
                    reason: e.to_string(),
                });
            }
        }

        run.warnings.extend(extraction.warnings());
        Ok(extraction.records)
    }

    /// Loads `url`, retrying a transient failure once after a short backoff
    async fn navigate(&self, page: &dyn BrowserPage, url: &str, fast: bool) -> Result<(), ScrapeError> {
        match page.navigate(url).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!("Navigation to {} failed, retrying once: {}", url, e);
                self.delays.pause(Phase::NavigationRetry, fast).await;
                page.navigate(url).await
            }
            Err(e) => Err(e),
        }
    }

    /// Accepts the consent interstitial when the page is showing it.
    /// Never fails the scrape.
    async fn handle_consent(
        &self,
        page: &dyn BrowserPage,
        fast: bool,
        warnings: &mut Vec<ScrapeWarning>,
    ) {
        let consent = &self.site.consent;
        let url = match page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not read URL for consent check: {}", e);
                return;
            }
        };
        if !consent.is_interstitial(&url) {
            debug!("No consent interstitial");
            return;
        }

        info!("Accepting consent form..");
        self.delays.pause(Phase::ConsentRead, fast).await;

        let mut clicked = false;
        for selector in &consent.accept_buttons {
            if !matches!(page.count(selector).await, Ok(n) if n > 0) {
                continue;
            }
            self.delays.pause(Phase::ConsentClick, fast).await;
            match page.click(selector).await {
                Ok(true) => {
                    clicked = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => debug!("Clicking consent button {} failed: {}", selector, e),
            }
        }

        if !clicked {
            warn!("Consent form button not found");
            warnings.push(ScrapeWarning::ConsentNotAccepted {
                reason: "no accept button found".to_string(),
            });
            return;
        }

        self.delays.pause(Phase::AfterConsent, fast).await;
        match page.current_url().await {
            Ok(url) if consent.is_interstitial(&url) => {
                warn!("Still on the consent page after accepting");
                warnings.push(ScrapeWarning::ConsentNotAccepted {
                    reason: "still on consent page after accepting".to_string(),
                });
            }
            Ok(_) => info!("Consent form accepted successfully"),
            Err(e) => warnings.push(ScrapeWarning::ConsentNotAccepted {
                reason: e.to_string(),
            }),
        }
    }

    async fn capture_debug(&self, query: &str, html: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.debug_dir).await?;
        let path = self.debug_dir.join(format!(
            "debug_{}_{}.html",
            query_slug(query),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        tokio::fs::write(&path, html).await?;
        info!("HTML content saved to {} for debugging", path.display());
        Ok(path)
    }
}
