//! Browser process management
//!
//! [`SessionManager`] owns the browser session that may be retained between
//! scrapes and launches fresh ones through a [`BrowserLauncher`]
//! (`ChromeLauncher` in production).
//!
//! [`BrowserLauncher`]: crate::traits::BrowserLauncher

pub mod chrome;
pub mod session;

pub use chrome::{ChromeLauncher, ChromePage};
pub use session::{BrowserSession, SessionLease, SessionManager};
