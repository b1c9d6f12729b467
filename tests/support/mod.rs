//! Simulated browser used by the integration tests.
//!
//! The page serves a results feed in the markup the Google Shopping profile
//! expects. Items appear gradually as `count` is polled and each scroll
//! loads the next page of the feed.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shopping_scraper::browser::SessionManager;
use shopping_scraper::delay::DelayPolicy;
use shopping_scraper::error::ScrapeError;
use shopping_scraper::scraper::ShoppingScraper;
use shopping_scraper::scraper::scroller::ScrollSettings;
use shopping_scraper::scrapers::google_shopping;
use shopping_scraper::traits::{BrowserLauncher, BrowserPage, ScrollPosition};

/// How the simulated results page behaves
#[derive(Debug, Clone)]
pub struct Script {
    pub total: usize,
    pub page_size: usize,
    /// Items that become visible per `count` call
    pub reveal_step: usize,
    /// Render title anchors; without them only the broad containers match
    pub anchors: bool,
    /// Item indexes rendered with an empty title
    pub untitled: Vec<usize>,
    /// Redirect the first navigation to the consent interstitial
    pub consent: bool,
    pub failing_navigations: u32,
    pub fail_content: bool,
    /// Keep adding items forever so the page never settles
    pub growing: bool,
    pub blocked: bool,
    pub fail_launch: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            total: 30,
            page_size: 10,
            reveal_step: 5,
            anchors: true,
            untitled: Vec::new(),
            consent: false,
            failing_navigations: 0,
            fail_content: false,
            growing: false,
            blocked: false,
            fail_launch: false,
        }
    }
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default)]
struct PageState {
    url: String,
    loaded: bool,
    scrolls: usize,
    rendered: usize,
    offset: f64,
    failures_left: u32,
    on_consent: bool,
    consented: bool,
    continue_to: String,
}

pub struct SimulatedPage {
    script: Script,
    anchor: String,
    container: String,
    accept: String,
    state: Mutex<PageState>,
    log: EventLog,
    closes: Arc<AtomicUsize>,
}

impl SimulatedPage {
    pub fn new(script: Script) -> Self {
        Self::with_log(script, EventLog::default(), Arc::default())
    }

    fn with_log(script: Script, log: EventLog, closes: Arc<AtomicUsize>) -> Self {
        let profile = google_shopping::profile();
        let state = PageState {
            url: "about:blank".to_string(),
            failures_left: script.failing_navigations,
            ..PageState::default()
        };

        Self {
            script,
            anchor: profile.selectors.item_anchor,
            container: profile.selectors.item_container,
            accept: profile.consent.accept_buttons[0].clone(),
            state: Mutex::new(state),
            log,
            closes,
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(event.to_string());
    }

    fn target(&self, state: &PageState) -> usize {
        if !state.loaded || state.on_consent {
            0
        } else if self.script.growing {
            usize::MAX
        } else {
            (self.script.page_size * (state.scrolls + 1)).min(self.script.total)
        }
    }

    fn render(&self, state: &PageState) -> String {
        if state.on_consent {
            return r#"<html><body><form action="https://consent.google.com/save">
                <button id="L2AGLb">Accept all</button></form></body></html>"#
                .to_string();
        }

        let mut html = String::from(r#"<html><body><div id="rso">"#);
        if self.script.blocked {
            html.push_str("<p>Our systems have detected unusual traffic from your computer network.</p>");
        }
        for i in 0..state.rendered {
            let title = if self.script.untitled.contains(&i) {
                String::new()
            } else {
                format!("Product {}", i + 1)
            };
            let title_markup = if self.script.anchors {
                format!(r#"<h3 class="gkQHve SsM98d RmEs5b">{title}</h3>"#)
            } else {
                format!(r#"<span class="tAxDx">{title}</span>"#)
            };
            html.push_str(&format!(
                r#"<div class="sh-dgr__grid-result" data-docid="{i}">
                  <a href="/shopping/product/{i}"><img src="https://encrypted-tbn0.gstatic.com/shopping?q=tbn:{i}"></a>
                  {title_markup}
                  <span class="lmQWe">${}.99</span>
                  <span class="WJMUdc">Store {}</span>
                </div>"#,
                100 + i,
                i % 3
            ));
        }
        html.push_str("</div></body></html>");
        html
    }
}

#[async_trait]
impl BrowserPage for SimulatedPage {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.record("navigate");
        let mut state = self.state.lock().unwrap();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(ScrapeError::Navigation("net::ERR_TIMED_OUT".to_string()));
        }

        state.loaded = true;
        state.scrolls = 0;
        state.rendered = 0;
        state.offset = 0.0;
        if self.script.consent && !state.consented {
            state.on_consent = true;
            state.continue_to = url.to_string();
            state.url = format!("https://consent.google.com/ml?continue={url}");
        } else {
            state.url = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn count(&self, selector: &str) -> Result<usize, ScrapeError> {
        let mut state = self.state.lock().unwrap();
        if selector == self.accept {
            return Ok(usize::from(state.on_consent));
        }
        let items = selector == self.container || (selector == self.anchor && self.script.anchors);
        if !items {
            return Ok(0);
        }

        let target = self.target(&state);
        state.rendered = state
            .rendered
            .saturating_add(self.script.reveal_step)
            .min(target);
        Ok(state.rendered)
    }

    async fn click(&self, selector: &str) -> Result<bool, ScrapeError> {
        let mut state = self.state.lock().unwrap();
        if state.on_consent && selector == self.accept {
            state.on_consent = false;
            state.consented = true;
            state.url = state.continue_to.clone();
            return Ok(true);
        }
        Ok(false)
    }

    async fn viewport_height(&self) -> Result<u32, ScrapeError> {
        Ok(1000)
    }

    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, ScrapeError> {
        let mut state = self.state.lock().unwrap();
        state.scrolls += 1;
        state.offset += f64::from(pixels);
        Ok(ScrollPosition {
            offset: state.offset,
            height: 1000.0 * (state.scrolls + 1) as f64,
        })
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.record("content");
        if self.script.fail_content {
            return Err(ScrapeError::Driver("target crashed".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(self.render(&state))
    }

    async fn reset(&self) -> Result<(), ScrapeError> {
        self.record("reset");
        let mut state = self.state.lock().unwrap();
        let failures_left = state.failures_left;
        *state = PageState {
            url: "about:blank".to_string(),
            failures_left,
            ..PageState::default()
        };
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        self.record("close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches [`SimulatedPage`]s that share one event log
#[derive(Default)]
pub struct SimulatedLauncher {
    script: Script,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
    log: EventLog,
}

impl SimulatedLauncher {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Self::default()
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for SimulatedLauncher {
    async fn launch(&self, _headless: bool) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        if self.script.fail_launch {
            return Err(ScrapeError::SessionStart("chrome not found".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("launch".to_string());
        Ok(Box::new(SimulatedPage::with_log(
            self.script.clone(),
            Arc::clone(&self.log),
            Arc::clone(&self.closes),
        )))
    }
}

pub fn scraper_for(launcher: &Arc<SimulatedLauncher>) -> Arc<ShoppingScraper> {
    scraper_with_debug_dir(launcher, std::env::temp_dir().join("shopping-scraper-tests"))
}

pub fn scraper_with_debug_dir(
    launcher: &Arc<SimulatedLauncher>,
    debug_dir: PathBuf,
) -> Arc<ShoppingScraper> {
    let sessions = Arc::new(SessionManager::new(launcher.clone()));
    let scraper = ShoppingScraper::with_parts(
        sessions,
        google_shopping::profile(),
        DelayPolicy::default(),
        ScrollSettings::default(),
        Duration::from_secs(10),
        debug_dir,
    )
    .unwrap();
    Arc::new(scraper)
}

/// A scraper whose fast mode is nearly instant, for tests on real time
pub fn quick_scraper(launcher: &Arc<SimulatedLauncher>) -> Arc<ShoppingScraper> {
    let sessions = Arc::new(SessionManager::new(launcher.clone()));
    let scraper = ShoppingScraper::with_parts(
        sessions,
        google_shopping::profile(),
        DelayPolicy::new(0.01),
        ScrollSettings::default(),
        Duration::from_secs(10),
        std::env::temp_dir().join("shopping-scraper-tests"),
    )
    .unwrap();
    Arc::new(scraper)
}
