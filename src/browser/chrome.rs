//! Chrome DevTools implementation of the browser traits using `chromiumoxide`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::ScrapeError;
use crate::traits::{BrowserLauncher, BrowserPage, ScrollPosition};

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const LAUNCH_FLAGS: [&str; 12] = [
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-features=VizDisplayCompositor,TranslateUI",
    "--disable-ipc-flooding-protection",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-default-apps",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Injected before every document so the page sees an ordinary browser.
const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 4 });
Object.defineProperty(navigator, 'deviceMemory', { get: () => 8 });
";

/// Finds a Chromium-family executable on PATH.
pub fn find_chrome_executable() -> Option<PathBuf> {
    const CANDIDATES: [&str; 5] = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| CANDIDATES.iter().map(move |exe| dir.join(exe)))
        .find(|candidate| candidate.exists())
}

/// Launches local Chrome processes over the DevTools protocol
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    window_size: (u32, u32),
}

impl ChromeLauncher {
    pub fn new(settings: &Settings) -> Self {
        let executable = settings
            .chrome_executable
            .clone()
            .or_else(find_chrome_executable);

        Self {
            executable,
            window_size: settings.window_size,
        }
    }

    fn browser_config(&self, headless: bool) -> Result<BrowserConfig, ScrapeError> {
        let (width, height) = self.window_size;
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .args(LAUNCH_FLAGS)
            .arg(format!("--user-agent={user_agent}"));

        if !headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }

        builder
            .build()
            .map_err(|e| ScrapeError::SessionStart(format!("invalid browser config: {e}")))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let config = self.browser_config(headless)?;
        let executable = self
            .executable
            .as_deref()
            .map_or_else(|| "<auto-detected>".into(), Path::to_string_lossy);
        info!("Launching Chrome ({}), headless: {}", executable, headless);

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::SessionStart(format!("failed to launch Chrome: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(ScrapeError::SessionStart(format!("failed to open tab: {e}")));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            error!("Failed to inject stealth script: {}", e);
        }

        Ok(Box::new(ChromePage {
            browser,
            page,
            handler,
        }))
    }
}

/// The working tab of a launched Chrome process
pub struct ChromePage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromePage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, ScrapeError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Driver(format!("script evaluation failed: {e}")))?
            .into_value::<T>()
            .map_err(|e| ScrapeError::Driver(format!("unexpected script result: {e}")))
    }
}

fn js_string(value: &str) -> Result<String, ScrapeError> {
    serde_json::to_string(value)
        .map_err(|e| ScrapeError::Configuration(format!("unusable selector {value:?}: {e}")))
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::Navigation(format!("failed to load {url}: {e}")))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScrapeError::Driver(format!("failed to read page URL: {e}")))
    }

    async fn count(&self, selector: &str) -> Result<usize, ScrapeError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)?
        );
        self.eval(script).await
    }

    async fn click(&self, selector: &str) -> Result<bool, ScrapeError> {
        let script = format!(
            r"(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }})()",
            js_string(selector)?
        );
        self.eval(script).await
    }

    async fn viewport_height(&self) -> Result<u32, ScrapeError> {
        self.eval("window.innerHeight".to_string()).await
    }

    async fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, ScrapeError> {
        let script = format!(
            r"(() => {{
                window.scrollBy(0, {pixels});
                return {{ offset: window.scrollY, height: document.body.scrollHeight }};
            }})()"
        );
        self.eval(script).await
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to read page content: {e}")))
    }

    async fn reset(&self) -> Result<(), ScrapeError> {
        if let Err(e) = self
            .page
            .evaluate("try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}")
            .await
        {
            debug!("Failed to clear page storage: {}", e);
        }

        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to clear cookies: {e}")))?;

        self.page
            .goto("about:blank")
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to park tab: {e}")))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Driver(format!("failed to close Chrome: {e}")));

        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for Chrome to exit failed: {}", e);
        }
        self.handler.abort();

        closed
    }
}
