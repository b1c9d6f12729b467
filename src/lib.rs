//! Browser-driven scraper for shopping search results.
//!
//! A [`ShoppingScraper`] drives one browser tab through navigation, consent
//! handling, stabilization and incremental scrolling, then extracts product
//! records from the rendered page. Browser processes are owned by a
//! [`SessionManager`] that can keep one session alive between scrapes.

pub mod api;
pub mod browser;
pub mod config;
pub mod delay;
pub mod error;
pub mod models;
pub mod output;
pub mod scraper;
pub mod scrapers;
pub mod traits;

pub use browser::SessionManager;
pub use config::{ScrapeConfig, Settings};
pub use error::{ScrapeError, ScrapeWarning};
pub use models::{ProductRecord, ScrapeResult};
pub use scraper::{ScrapeState, ShoppingScraper};
