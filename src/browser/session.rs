//! Browser session ownership, reuse and teardown

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::traits::{BrowserLauncher, BrowserPage};

/// One live browser process and the tab the scraper drives
pub struct BrowserSession {
    id: u64,
    created_at: DateTime<Utc>,
    headless: bool,
    fast: bool,
    alive: bool,
    uses: u32,
    page: Box<dyn BrowserPage>,
}

impl BrowserSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn fast(&self) -> bool {
        self.fast
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Number of scrapes this session has been leased for
    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    async fn close(mut self) {
        self.alive = false;
        match self.page.close().await {
            Ok(()) => info!("Closed browser session #{}", self.id),
            Err(e) => warn!("Error while closing browser session #{}: {}", self.id, e),
        }
    }
}

impl fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("headless", &self.headless)
            .field("fast", &self.fast)
            .field("alive", &self.alive)
            .field("uses", &self.uses)
            .finish_non_exhaustive()
    }
}

/// A caller's exclusive hold on a session between `acquire` and `release`.
///
/// A retained lease keeps the session slot locked, so other keep-session
/// callers wait until it is released.
pub enum SessionLease {
    Retained {
        slot: OwnedMutexGuard<Option<BrowserSession>>,
        session: BrowserSession,
    },
    Detached(BrowserSession),
}

impl SessionLease {
    pub fn session(&self) -> &BrowserSession {
        match self {
            Self::Retained { session, .. } | Self::Detached(session) => session,
        }
    }

    pub fn is_retained(&self) -> bool {
        matches!(self, Self::Retained { .. })
    }
}

/// Owns the retained browser session and launches new ones on demand
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    retained: Arc<Mutex<Option<BrowserSession>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            retained: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Returns a live session for `config`.
    ///
    /// With `keep_session` the retained session is reused, unless it is dead
    /// or was started with a different headless setting, in which case it is
    /// replaced. Otherwise a fresh session is launched for this caller only.
    pub async fn acquire(&self, config: &ScrapeConfig) -> Result<SessionLease, ScrapeError> {
        if !config.keep_session {
            let mut session = self.launch(config).await?;
            session.uses += 1;
            return Ok(SessionLease::Detached(session));
        }

        let mut slot = Arc::clone(&self.retained).lock_owned().await;
        let mut session = match slot.take() {
            Some(held) if held.alive && held.headless == config.headless => {
                info!(
                    "Reusing browser session #{} (created {})",
                    held.id, held.created_at
                );
                held
            }
            Some(held) => {
                info!(
                    "Replacing browser session #{} (alive: {}, headless: {} -> {})",
                    held.id, held.alive, held.headless, config.headless
                );
                held.close().await;
                self.launch(config).await?
            }
            None => self.launch(config).await?,
        };
        session.uses += 1;

        Ok(SessionLease::Retained { slot, session })
    }

    /// Hands a session back.
    ///
    /// `keep` retains a session leased from the retained slot after clearing
    /// its page state; every other combination tears the session down.
    pub async fn release(&self, lease: SessionLease, keep: bool) {
        match lease {
            SessionLease::Retained {
                mut slot,
                mut session,
            } if keep => match session.page.reset().await {
                Ok(()) => {
                    debug!("Browser session #{} reset and retained", session.id);
                    *slot = Some(session);
                }
                Err(e) => {
                    warn!(
                        "Failed to reset browser session #{}, closing it: {}",
                        session.id, e
                    );
                    session.alive = false;
                    session.close().await;
                }
            },
            SessionLease::Retained { session, .. } | SessionLease::Detached(session) => {
                session.close().await;
            }
        }
    }

    /// Closes the retained session if there is one.
    ///
    /// # Returns
    /// * `bool` - whether a session was closed
    pub async fn shutdown(&self) -> bool {
        let held = self.retained.lock().await.take();
        match held {
            Some(session) => {
                info!("Shutting down retained browser session #{}", session.id);
                session.close().await;
                true
            }
            None => {
                debug!("No retained browser session to shut down");
                false
            }
        }
    }

    /// Identity of the retained session, if any
    pub async fn retained_session(&self) -> Option<(u64, DateTime<Utc>)> {
        self.retained
            .lock()
            .await
            .as_ref()
            .map(|session| (session.id, session.created_at))
    }

    async fn launch(&self, config: &ScrapeConfig) -> Result<BrowserSession, ScrapeError> {
        let page = self.launcher.launch(config.headless).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Started browser session #{} (headless: {}, fast: {})",
            id, config.headless, config.fast
        );

        Ok(BrowserSession {
            id,
            created_at: Utc::now(),
            headless: config.headless,
            fast: config.fast,
            alive: true,
            uses: 0,
            page,
        })
    }
}
