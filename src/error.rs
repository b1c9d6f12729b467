//! Error and warning types shared by the scraping pipeline

use serde::Serialize;

/// Failures that end a scrape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrapeError {
    /// Bad caller input or an invalid site profile. Never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The browser process could not be launched. Never retried.
    #[error("failed to start browser session: {0}")]
    SessionStart(String),

    /// Navigation to the search page failed. Retried once by the orchestrator.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Any other failure reported by the automation driver.
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl ScrapeError {
    /// Short machine-readable name used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::SessionStart(_) => "session_start",
            Self::Navigation(_) => "navigation",
            Self::Driver(_) => "driver",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Navigation(_))
    }
}

/// Degradations recorded during a run. They never abort the scrape and are
/// surfaced in the result metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeWarning {
    /// The result region was still changing when a stabilization wait timed out.
    PageNotStable { phase: String, item_count: usize },
    /// Item containers were found but no title could be read from them.
    ItemsWithoutTitle { dropped: usize },
    /// Listings identical to one already emitted were skipped.
    DuplicatesDropped { dropped: usize },
    /// Title anchors whose product card could not be told apart from another
    /// card's.
    ItemsWithoutContainer { dropped: usize },
    /// The consent interstitial was shown but could not be dismissed.
    ConsentNotAccepted { reason: String },
    /// The final page looks like a CAPTCHA or an "unusual traffic" block.
    CaptchaSuspected,
    /// Writing the debug page snapshot failed.
    DebugCaptureFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_navigation_is_transient() {
        assert!(ScrapeError::Navigation("timeout".into()).is_transient());
        assert!(!ScrapeError::Configuration("empty".into()).is_transient());
        assert!(!ScrapeError::SessionStart("missing".into()).is_transient());
        assert!(!ScrapeError::Driver("closed".into()).is_transient());
    }

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = ScrapeWarning::ItemsWithoutTitle { dropped: 2 };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "items_without_title");
        assert_eq!(json["dropped"], 2);
    }
}
