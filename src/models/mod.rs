//! Data models for scraped product listings and scrape results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScrapeConfig;
use crate::error::ScrapeWarning;

/// A product listing scraped from a shopping results page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// md5 of title and link, stable across runs
    pub id: String,
    pub title: String,
    pub price: Option<String>,
    /// ISO-4217 code derived from the price text
    pub currency: Option<String>,
    pub seller: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub link: Option<String>,
    pub thumbnail: Option<String>,
    pub delivery: Option<String>,
}

impl ProductRecord {
    /// Creates a record with only a title; every optional field starts empty.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let id = record_id(&[title.as_str(), "", ""]);
        Self {
            id,
            title,
            price: None,
            currency: None,
            seller: None,
            rating: None,
            review_count: None,
            link: None,
            thumbnail: None,
            delivery: None,
        }
    }

    /// Recomputes the identifier once the other fields are known.
    ///
    /// Title and link identify a listing. Without a link, seller and price
    /// keep offers of the same product apart.
    pub fn refresh_id(&mut self) {
        self.id = match &self.link {
            Some(link) => record_id(&[self.title.as_str(), link.as_str()]),
            None => record_id(&[
                self.title.as_str(),
                self.seller.as_deref().unwrap_or(""),
                self.price.as_deref().unwrap_or(""),
            ]),
        };
    }
}

fn record_id(parts: &[&str]) -> String {
    format!("{:x}", md5::compute(parts.join("|")))
}

/// Flags a scrape actually ran with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeMode {
    pub headless: bool,
    pub fast: bool,
    pub keep_session: bool,
}

impl From<&ScrapeConfig> for ScrapeMode {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            headless: config.headless,
            fast: config.fast,
            keep_session: config.keep_session,
        }
    }
}

/// Outcome of one orchestrated scrape
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub query: String,
    pub count: usize,
    pub elapsed_seconds: f64,
    pub scraped_at: DateTime<Utc>,
    pub mode: ScrapeMode,
    pub warnings: Vec<ScrapeWarning>,
    pub results: Vec<ProductRecord>,
}

impl ScrapeResult {
    pub fn new(
        config: &ScrapeConfig,
        results: Vec<ProductRecord>,
        warnings: Vec<ScrapeWarning>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            query: config.query.clone(),
            count: results.len(),
            elapsed_seconds,
            scraped_at: Utc::now(),
            mode: ScrapeMode::from(config),
            warnings,
            results,
        }
    }
}
