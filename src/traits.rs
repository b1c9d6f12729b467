//! Traits and site profile types shared by the scraping pipeline

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ScrapeError;

/// Everything the scraper needs to know about one shopping site
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Display name for the website
    pub name: String,
    /// Base URL used to absolutize relative links
    pub base_url: String,
    /// Search URL pattern with {query} placeholder
    pub search_url_pattern: String,
    /// CSS selectors for extracting data
    pub selectors: SiteSelectors,
    /// How the pre-consent interstitial is recognised and dismissed
    pub consent: ConsentSelectors,
}

impl SiteProfile {
    /// Builds the results URL for a search term
    pub fn build_search_url(&self, search_term: &str) -> String {
        let encoded_term = urlencoding::encode(search_term.trim());
        self.search_url_pattern.replace("{query}", &encoded_term)
    }

    /// Resolves a possibly relative href against the site base URL
    pub fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http") || href.starts_with("data:") {
            href.to_string()
        } else if href.starts_with("//") {
            format!("https:{href}")
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), href)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), href)
        }
    }
}

/// CSS selectors for the parts of a product listing
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Narrow selector matching one element per product (its title).
    /// Checked first when waiting for results.
    pub item_anchor: String,
    /// Broad product container selector, used when no anchor matches
    pub item_container: String,
    /// Title selector within a product container
    pub title: String,
    /// Price selector within a product container
    pub price: String,
    /// Seller/store name selector (optional)
    pub seller: Option<String>,
    /// Star rating selector (optional)
    pub rating: Option<String>,
    /// Review count selector (optional)
    pub review_count: Option<String>,
    /// Product link selector within a product container
    pub link: String,
    /// Image selector within a product container
    pub image: String,
    /// Delivery cost/text selector (optional)
    pub delivery: Option<String>,
}

/// Selectors and URL markers for the consent interstitial
#[derive(Debug, Clone)]
pub struct ConsentSelectors {
    /// Substrings of the current URL that identify the interstitial
    pub url_markers: Vec<String>,
    /// Accept buttons, tried in order
    pub accept_buttons: Vec<String>,
}

impl ConsentSelectors {
    pub fn is_interstitial(&self, url: &str) -> bool {
        self.url_markers.iter().any(|marker| url.contains(marker.as_str()))
    }
}

/// Scroll offset and document height after a scroll step
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollPosition {
    pub offset: f64,
    pub height: f64,
}

/// The single tab of a controllable browser process.
///
/// Implemented over the Chrome DevTools protocol in production and by a
/// simulated page in tests.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Loads `url` and waits for the navigation to commit
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    /// Number of elements currently matching `selector`
    async fn count(&self, selector: &str) -> Result<usize, ScrapeError>;

    /// Clicks the first element matching `selector`.
    ///
    /// # Returns
    /// * `Ok(false)` - nothing matched
    async fn click(&self, selector: &str) -> Result<bool, ScrapeError>;

    async fn viewport_height(&self) -> Result<u32, ScrapeError>;

    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, ScrapeError>;

    /// Serialized DOM of the current document
    async fn content(&self) -> Result<String, ScrapeError>;

    /// Clears cookies and storage and parks the tab on a blank document
    async fn reset(&self) -> Result<(), ScrapeError>;

    /// Terminates the browser process
    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser and return its working tab.
    ///
    /// Failures are reported as [`ScrapeError::SessionStart`].
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserPage>, ScrapeError>;
}
