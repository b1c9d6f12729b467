//! Per-scrape configuration and environment-driven settings

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::ScrapeError;

/// Options for a single scrape. Built once per invocation or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub query: String,
    pub headless: bool,
    /// Scales every delay by the configured fast factor
    pub fast: bool,
    /// Retain the browser for the next scrape instead of closing it
    pub keep_session: bool,
    pub max_results: Option<usize>,
    /// Save a snapshot of the final page under the debug directory
    pub debug: bool,
}

impl ScrapeConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            headless: true,
            fast: false,
            keep_session: false,
            max_results: None,
            debug: false,
        }
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    #[must_use]
    pub fn keep_session(mut self, keep: bool) -> Self {
        self.keep_session = keep;
        self
    }

    #[must_use]
    pub fn max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Checks caller input before any browser is touched.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.query.trim().is_empty() {
            return Err(ScrapeError::Configuration(
                "query must not be empty".to_string(),
            ));
        }
        if self.max_results == Some(0) {
            return Err(ScrapeError::Configuration(
                "max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `true` once `count` items satisfy the optional result cap.
    pub fn cap_reached(&self, count: usize) -> bool {
        self.max_results.is_some_and(|max| count >= max)
    }
}

/// Process-wide scraper settings loaded from the environment.
///
/// `.env` is honoured when the binary calls `dotenvy::dotenv()` first.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Explicit browser binary; PATH is searched when unset
    pub chrome_executable: Option<PathBuf>,
    pub debug_dir: PathBuf,
    /// Multiplier applied to every delay in fast mode
    pub fast_factor: f64,
    pub stabilize_timeout: Duration,
    pub max_scrolls: u32,
    pub stall_limit: u32,
    pub window_size: (u32, u32),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            debug_dir: PathBuf::from("debug"),
            fast_factor: 0.3,
            stabilize_timeout: Duration::from_secs(10),
            max_scrolls: 10,
            stall_limit: 3,
            window_size: (1920, 1080),
        }
    }
}

impl Settings {
    /// Reads `CHROME_EXECUTABLE` and the `SCRAPER_*` variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from),
            debug_dir: std::env::var("SCRAPER_DEBUG_DIR")
                .map_or(defaults.debug_dir, PathBuf::from),
            fast_factor: env_or("SCRAPER_FAST_FACTOR", defaults.fast_factor)?,
            stabilize_timeout: Duration::from_secs(env_or(
                "SCRAPER_STABILIZE_TIMEOUT_SECS",
                defaults.stabilize_timeout.as_secs(),
            )?),
            max_scrolls: env_or("SCRAPER_MAX_SCROLLS", defaults.max_scrolls)?,
            stall_limit: env_or("SCRAPER_STALL_LIMIT", defaults.stall_limit)?,
            window_size: (
                env_or("SCRAPER_WINDOW_WIDTH", defaults.window_size.0)?,
                env_or("SCRAPER_WINDOW_HEIGHT", defaults.window_size.1)?,
            ),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fast_factor > 0.0 && self.fast_factor <= 1.0) {
            anyhow::bail!(
                "SCRAPER_FAST_FACTOR must be in (0, 1], got {}",
                self.fast_factor
            );
        }
        if self.max_scrolls == 0 || self.stall_limit == 0 {
            anyhow::bail!("SCRAPER_MAX_SCROLLS and SCRAPER_STALL_LIMIT must be positive");
        }
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {key}={raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_query_is_rejected() {
        let err = ScrapeConfig::new("   \t").validate().unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let config = ScrapeConfig::new("laptop").max_results(Some(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn cap_reached_only_with_cap() {
        let uncapped = ScrapeConfig::new("laptop");
        assert!(!uncapped.cap_reached(10_000));

        let capped = uncapped.max_results(Some(5));
        assert!(!capped.cap_reached(4));
        assert!(capped.cap_reached(5));
    }

    #[test]
    fn fast_factor_out_of_range_fails_validation() {
        let settings = Settings {
            fast_factor: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }
}
