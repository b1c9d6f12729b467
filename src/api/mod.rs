//! HTTP interface over the scraper

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::models::ScrapeResult;
use crate::scraper::ShoppingScraper;

#[derive(Clone)]
pub struct AppState {
    scraper: Arc<ShoppingScraper>,
}

impl AppState {
    pub fn new(scraper: Arc<ShoppingScraper>) -> Self {
        Self { scraper }
    }
}

/// Query string of `GET /scrape`
#[derive(Debug, Default, Deserialize)]
pub struct ScrapeParams {
    pub query: Option<String>,
    pub headless: Option<bool>,
    pub fast: Option<bool>,
    pub keep_browser: Option<bool>,
    pub max_results: Option<usize>,
    pub debug: Option<bool>,
}

impl ScrapeParams {
    pub fn into_config(self) -> ScrapeConfig {
        ScrapeConfig::new(self.query.unwrap_or_default())
            .headless(self.headless.unwrap_or(true))
            .fast(self.fast.unwrap_or(false))
            .keep_session(self.keep_browser.unwrap_or(false))
            .max_results(self.max_results)
            .debug(self.debug.unwrap_or(false))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// A [`ScrapeError`] rendered as a JSON response
pub struct ApiError(pub ScrapeError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ScrapeError::Configuration(_) => StatusCode::BAD_REQUEST,
            ScrapeError::Navigation(_) => StatusCode::BAD_GATEWAY,
            ScrapeError::SessionStart(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScrapeError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/scrape", get(scrape))
        .route("/cleanup", post(cleanup))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves, then closes the
/// retained browser session.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let scraper = Arc::clone(&state.scraper);
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    scraper.sessions().shutdown().await;
    info!("API stopped");
    Ok(())
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "shopping-scraper",
        "version": env!("CARGO_PKG_VERSION"),
        "site": state.scraper.site().name,
        "endpoints": {
            "GET /scrape": "query, headless, fast, keep_browser, max_results, debug",
            "POST /cleanup": "close the retained browser session",
            "GET /health": "liveness probe",
        },
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn scrape(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> Result<Json<ScrapeResult>, ApiError> {
    let config = params.into_config();
    config.validate()?;

    // The scrape keeps running if the client goes away, so a retained
    // session is always released properly.
    let scraper = Arc::clone(&state.scraper);
    let task = tokio::spawn(async move { scraper.scrape(&config).await });

    match task.await {
        Ok(outcome) => Ok(Json(outcome?)),
        Err(e) => {
            error!("Scrape task aborted: {}", e);
            Err(ApiError(ScrapeError::Driver(format!(
                "scrape task aborted: {e}"
            ))))
        }
    }
}

async fn cleanup(State(state): State<AppState>) -> Json<serde_json::Value> {
    let closed = state.scraper.sessions().shutdown().await;
    let status = if closed {
        "browser session closed"
    } else {
        "no browser session to close"
    };
    Json(json!({ "status": status, "closed": closed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_headless_single_use() {
        let config = ScrapeParams {
            query: Some("laptop".to_string()),
            ..ScrapeParams::default()
        }
        .into_config();

        assert!(config.headless);
        assert!(!config.fast);
        assert!(!config.keep_session);
        assert_eq!(config.max_results, None);
    }

    #[test]
    fn missing_query_is_rejected() {
        let config = ScrapeParams::default().into_config();
        assert!(matches!(
            config.validate(),
            Err(ScrapeError::Configuration(_))
        ));
    }

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (ScrapeError::Configuration("x".into()), StatusCode::BAD_REQUEST),
            (ScrapeError::Navigation("x".into()), StatusCode::BAD_GATEWAY),
            (
                ScrapeError::SessionStart("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ScrapeError::Driver("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }
}
